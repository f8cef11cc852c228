//! Refresh scheduling policy
//!
//! The next refresh is due `safety_margin` before the credential expires. The
//! policy is a single comparison against wall-clock time, so it is evaluated
//! against an injectable [`Clock`].

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Default buffer before expiry at which a proactive refresh runs
pub const DEFAULT_SAFETY_MARGIN_SECS: u32 = 60;

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Point in time at which a credential expiring at `expires_at` should be refreshed
#[must_use]
pub fn refresh_at(expires_at: DateTime<Utc>, safety_margin: TimeDelta) -> DateTime<Utc> {
    expires_at - safety_margin
}

/// Signed delay until the next refresh.
///
/// A non-positive value means the refresh is already due.
#[must_use]
pub fn refresh_delay(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    safety_margin: TimeDelta,
) -> TimeDelta {
    refresh_at(expires_at, safety_margin) - now
}

/// Converts a signed refresh delay into a timer duration, clamping overdue delays to zero
#[must_use]
pub fn timer_duration(delay: TimeDelta) -> Duration {
    delay.to_std().unwrap_or(Duration::ZERO)
}

/// Safety margin expressed as a signed delta
#[must_use]
pub fn safety_margin(secs: u32) -> TimeDelta {
    TimeDelta::seconds(i64::from(secs))
}
