//! Cancellable one-shot expiration timers.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::Clock;

struct Armed {
    at: DateTime<Utc>,
    task: JoinHandle<()>,
}

/// A single logical timer slot.
///
/// Arming with a new instant cancels whatever was armed before. The fire
/// action runs as its own task, so re-arming from inside the action (for
/// example when the action commits a renewed token) never cancels it.
pub struct ExpirationTimer {
    name: &'static str,
    armed: Mutex<Option<Armed>>,
}

impl ExpirationTimer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            armed: Mutex::new(None),
        }
    }

    /// Arm the slot for `at`. `None` disarms. An instant already in the past
    /// fires on the next scheduling opportunity, never synchronously.
    ///
    /// Returns true if a new timer was armed; re-arming with the instant that
    /// is already pending is a no-op.
    pub fn arm<F, Fut>(
        &self,
        runtime: &Handle,
        clock: &Arc<dyn Clock>,
        at: Option<DateTime<Utc>>,
        on_fire: F,
    ) -> bool
    where
        F: FnOnce(DateTime<Utc>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut armed = self.armed.lock();

        if let Some(current) = armed.as_ref() {
            if Some(current.at) == at && !current.task.is_finished() {
                return false;
            }
        }
        if let Some(previous) = armed.take() {
            previous.task.abort();
        }

        let Some(at) = at else {
            return false;
        };

        let delay = (at - clock.now()).to_std().unwrap_or(Duration::ZERO);
        let name = self.name;
        let spawner = runtime.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(timer = name, expires_at = %at, "Expiration timer fired");
            spawner.spawn(on_fire(at));
        });

        debug!(timer = name, expires_at = %at, delay_ms = delay.as_millis() as u64, "Armed expiration timer");
        *armed = Some(Armed { at, task });
        true
    }

    /// Cancel the pending timer, if any. Returns true if one was pending.
    pub fn disarm(&self) -> bool {
        match self.armed.lock().take() {
            Some(armed) => {
                let pending = !armed.task.is_finished();
                armed.task.abort();
                if pending {
                    debug!(timer = self.name, "Disarmed expiration timer");
                }
                pending
            }
            None => false,
        }
    }

    /// Instant the slot is waiting for, if still pending.
    pub fn armed_at(&self) -> Option<DateTime<Utc>> {
        self.armed
            .lock()
            .as_ref()
            .filter(|armed| !armed.task.is_finished())
            .map(|armed| armed.at)
    }
}

impl Drop for ExpirationTimer {
    fn drop(&mut self) {
        if let Some(armed) = self.armed.get_mut().take() {
            armed.task.abort();
        }
    }
}
