//! Wall-clock source.

use chrono::{DateTime, Utc};

/// Source of the current wall-clock instant.
///
/// Validity checks and timer delays both read the same clock, so an injected
/// clock keeps them consistent.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
