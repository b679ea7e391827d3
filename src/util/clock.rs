//! Wall-clock helpers.
//!
//! Components take `now_ms` explicitly so tests can drive time deterministically;
//! only the runtime layer reads the system clock.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Add a duration to a millisecond timestamp.
#[must_use]
pub fn after(now_ms: u128, delay: Duration) -> u128 {
    now_ms.saturating_add(delay.as_millis())
}

/// Whole seconds remaining until `deadline_ms`, rounded up, zero once passed.
#[must_use]
pub fn secs_until(deadline_ms: u128, now_ms: u128) -> u64 {
    let remaining = deadline_ms.saturating_sub(now_ms);
    u64::try_from(remaining.div_ceil(1000)).unwrap_or(u64::MAX)
}
