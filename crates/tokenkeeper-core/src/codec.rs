//! Expiration coercion and bundle validity.

use chrono::{DateTime, Duration, Utc};
use std::str::FromStr;

use crate::{Expiration, LifecycleError, LifecycleResult, TokenBundle};

/// Convert an expiration input into an absolute instant.
///
/// Seconds are relative to `now`; absolute instants pass through; absence
/// yields absence (the token never expires).
pub fn coerce_expiration(
    input: Option<Expiration>,
    now: DateTime<Utc>,
) -> LifecycleResult<Option<DateTime<Utc>>> {
    match input {
        None => Ok(None),
        Some(Expiration::At(at)) => Ok(Some(at)),
        Some(Expiration::Seconds(seconds)) => seconds_from(now, seconds).map(Some),
    }
}

fn seconds_from(now: DateTime<Utc>, seconds: f64) -> LifecycleResult<DateTime<Utc>> {
    if !seconds.is_finite() {
        return Err(LifecycleError::InvalidExpirationFormat(format!(
            "relative expiration must be finite, got {}",
            seconds
        )));
    }

    let millis = (seconds * 1000.0).round();
    if millis.abs() > i64::MAX as f64 {
        return Err(LifecycleError::InvalidExpirationFormat(format!(
            "relative expiration out of range: {}",
            seconds
        )));
    }

    Duration::try_milliseconds(millis as i64)
        .and_then(|offset| now.checked_add_signed(offset))
        .ok_or_else(|| {
            LifecycleError::InvalidExpirationFormat(format!(
                "relative expiration out of range: {}",
                seconds
            ))
        })
}

fn parse_instant(text: &str) -> LifecycleResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| {
            LifecycleError::InvalidExpirationFormat(format!("{:?}: {}", text, err))
        })
}

impl FromStr for Expiration {
    type Err = LifecycleError;

    /// A plain number is seconds from now; anything else must be RFC 3339.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(seconds) = trimmed.parse::<f64>() {
            if !seconds.is_finite() {
                return Err(LifecycleError::InvalidExpirationFormat(trimmed.to_string()));
            }
            return Ok(Expiration::Seconds(seconds));
        }
        parse_instant(trimmed).map(Expiration::At)
    }
}

/// True iff the bundle is present, has a non-empty token and is not expired
/// at `now`. Evaluated at call time; nothing is cached.
pub fn is_valid(bundle: Option<&TokenBundle>, now: DateTime<Utc>) -> bool {
    match bundle {
        Some(bundle) => {
            !bundle.token.is_empty() && bundle.expires_at.map_or(true, |at| at >= now)
        }
        None => false,
    }
}
