//! Wall-clock helpers shared by the schedulers

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Time left until `end`, or `None` when it is already due.
pub fn remaining_until(end: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    (end - now).to_std().ok().filter(|d| !d.is_zero())
}

/// `start + duration`, saturating at the largest representable instant.
pub fn add_duration(start: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| start.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `now - duration`, saturating at the earliest representable instant.
pub fn subtract_duration(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Absolute difference between two instants
pub fn abs_difference(a: DateTime<Utc>, b: DateTime<Utc>) -> Duration {
    (a - b).abs().to_std().unwrap_or(Duration::MAX)
}
