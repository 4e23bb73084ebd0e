//! Accounting periods and the clock they are measured against.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use std::sync::Arc;

use super::storage::StoredSubscription;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Freeze at a Unix timestamp (seconds).
    #[must_use]
    pub fn at_timestamp(secs: i64) -> Self {
        Self(Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// First instant of the UTC calendar month containing `now`.
#[must_use]
pub fn calendar_month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Start of the accounting period usage is counted against (Unix seconds).
///
/// A group counts against its provider billing period while that period is
/// running (or the subscription is active). Everyone else, including groups
/// whose last paid period has ended, counts against the UTC calendar month.
#[must_use]
pub fn accounting_period_start(subscription: Option<&StoredSubscription>, now: DateTime<Utc>) -> u64 {
    match subscription {
        Some(sub) if sub.is_active() || unix_seconds(now) < sub.current_period_end => {
            sub.current_period_start
        }
        _ => unix_seconds(calendar_month_start(now)),
    }
}

/// Unix seconds, clamped at the epoch.
#[must_use]
pub fn unix_seconds(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp()).unwrap_or(0)
}
