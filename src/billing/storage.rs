//! Storage traits for subscription snapshots and usage counters.
//!
//! Persistence lives in the hosted database. These traits are the read (and
//! conditional debit) contracts the entitlement code depends on; an in-memory
//! implementation is provided for testing.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::validation::GroupId;

/// Billing provider a subscription row belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingProvider {
    #[default]
    Stripe,
}

impl BillingProvider {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
        }
    }
}

impl fmt::Display for BillingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read access to subscription rows.
///
/// Rows are created on first checkout and updated by provider webhooks
/// elsewhere; this crate never writes them.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Get the subscription row for a group and provider. `None` means the
    /// group has never subscribed.
    async fn get_subscription(
        &self,
        group_id: &GroupId,
        provider: BillingProvider,
    ) -> Result<Option<StoredSubscription>>;
}

/// Access to per-period usage counters.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Get the usage counter for a group and accounting period.
    /// `None` means nothing has been consumed yet.
    async fn get_usage(&self, group_id: &GroupId, period_start: u64) -> Result<Option<UsageCounter>>;

    /// Add `credits` to the counter for `(group_id, period_start)`, but only
    /// if the result does not exceed `limit`. A `None` limit always applies.
    ///
    /// # Important: Implementations MUST make this atomic
    ///
    /// The entitlement check only reads. Two imports admitted concurrently
    /// against the last remaining credit both pass the check, so the debit
    /// itself has to refuse the overspend. Use a single conditional write:
    ///
    /// ```sql
    /// INSERT INTO usage_counters (group_id, period_start, used_credits)
    /// VALUES ($1, $2, $3)
    /// ON CONFLICT (group_id, period_start) DO UPDATE
    ///   SET used_credits = usage_counters.used_credits + $3
    ///   WHERE $4::int IS NULL OR usage_counters.used_credits + $3 <= $4
    /// RETURNING used_credits
    /// ```
    ///
    /// No returned row means the limit would have been exceeded.
    async fn try_consume(
        &self,
        group_id: &GroupId,
        period_start: u64,
        credits: u32,
        limit: Option<u32>,
    ) -> Result<ConsumeOutcome>;
}

#[async_trait]
impl<T: SubscriptionStore + ?Sized> SubscriptionStore for Arc<T> {
    async fn get_subscription(
        &self,
        group_id: &GroupId,
        provider: BillingProvider,
    ) -> Result<Option<StoredSubscription>> {
        (**self).get_subscription(group_id, provider).await
    }
}

#[async_trait]
impl<T: UsageStore + ?Sized> UsageStore for Arc<T> {
    async fn get_usage(&self, group_id: &GroupId, period_start: u64) -> Result<Option<UsageCounter>> {
        (**self).get_usage(group_id, period_start).await
    }

    async fn try_consume(
        &self,
        group_id: &GroupId,
        period_start: u64,
        credits: u32,
        limit: Option<u32>,
    ) -> Result<ConsumeOutcome> {
        (**self).try_consume(group_id, period_start, credits, limit).await
    }
}

/// Usage counter for one group and accounting period.
///
/// Monotonically non-decreasing within a period; a new period starts a new
/// counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    /// Credits consumed so far in the period.
    pub used_credits: u32,
}

/// Result of a conditional debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConsumeOutcome {
    /// The counter was incremented; `used` is the new value.
    Consumed { used: u32 },
    /// The increment would have exceeded the limit; `used` is unchanged.
    Rejected { used: u32 },
}

impl ConsumeOutcome {
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        matches!(self, Self::Consumed { .. })
    }
}

/// Subscription snapshot, synced from the provider via webhooks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSubscription {
    /// Provider customer ID.
    pub provider_customer_id: String,
    /// Provider subscription ID.
    pub provider_subscription_id: String,
    /// Subscription status.
    pub status: SubscriptionStatus,
    /// Current billing period start (Unix timestamp).
    pub current_period_start: u64,
    /// Current billing period end (Unix timestamp).
    pub current_period_end: u64,
    /// Whether the subscription will cancel at period end.
    pub cancel_at_period_end: bool,
}

impl StoredSubscription {
    /// Check if the subscription is active (including trialing).
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        )
    }

    /// Check if the subscription is canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.status == SubscriptionStatus::Canceled
    }

    /// Canceled, but the period already paid for has not ended yet.
    #[must_use]
    pub fn in_grace_period(&self, now: u64) -> bool {
        self.is_canceled() && self.current_period_end > now
    }
}

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is active and paid.
    Active,
    /// Subscription is in trial period.
    Trialing,
    /// Payment failed, subscription still active but past due.
    PastDue,
    /// Subscription has been canceled.
    Canceled,
    /// Subscription is incomplete (awaiting payment).
    Incomplete,
    /// Subscription expired after incomplete payment.
    IncompleteExpired,
    /// Subscription is paused.
    Paused,
    /// Subscription is unpaid.
    Unpaid,
}

impl SubscriptionStatus {
    /// Parse from a Stripe subscription status string.
    #[must_use]
    pub fn from_stripe(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "past_due" => Self::PastDue,
            "canceled" => Self::Canceled,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "paused" => Self::Paused,
            "unpaid" => Self::Unpaid,
            _ => Self::IncompleteExpired, // Unknown statuses grant neither a plan nor grace
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Paused => "paused",
            Self::Unpaid => "unpaid",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(any(test, feature = "test-billing"))]
pub mod test {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, RwLock};

    /// In-memory subscription store for testing.
    ///
    /// Wraps data in Arc for cheap cloning.
    #[derive(Default, Clone)]
    pub struct InMemorySubscriptionStore {
        subscriptions: Arc<RwLock<HashMap<(String, BillingProvider), StoredSubscription>>>,
        unavailable: Arc<AtomicBool>,
    }

    impl InMemorySubscriptionStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Insert or replace a group's subscription row.
        pub fn save_subscription(
            &self,
            group_id: &GroupId,
            provider: BillingProvider,
            subscription: StoredSubscription,
        ) {
            self.subscriptions
                .write()
                .unwrap()
                .insert((group_id.as_str().to_string(), provider), subscription);
        }

        /// Make every read fail, simulating an outage.
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SubscriptionStore for InMemorySubscriptionStore {
        async fn get_subscription(
            &self,
            group_id: &GroupId,
            provider: BillingProvider,
        ) -> Result<Option<StoredSubscription>> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(AppError::service_unavailable("subscription store offline"));
            }
            Ok(self
                .subscriptions
                .read()
                .unwrap()
                .get(&(group_id.as_str().to_string(), provider))
                .cloned())
        }
    }

    /// In-memory usage store for testing.
    ///
    /// `try_consume` runs under a single lock, so the check and the increment
    /// cannot interleave.
    #[derive(Default, Clone)]
    pub struct InMemoryUsageStore {
        counters: Arc<Mutex<HashMap<(String, u64), u32>>>,
        unavailable: Arc<AtomicBool>,
    }

    impl InMemoryUsageStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a counter.
        pub fn set_usage(&self, group_id: &GroupId, period_start: u64, used_credits: u32) {
            self.counters
                .lock()
                .unwrap()
                .insert((group_id.as_str().to_string(), period_start), used_credits);
        }

        /// Current counter value, 0 when absent.
        pub fn used(&self, group_id: &GroupId, period_start: u64) -> u32 {
            self.counters
                .lock()
                .unwrap()
                .get(&(group_id.as_str().to_string(), period_start))
                .copied()
                .unwrap_or(0)
        }

        /// Make every read and write fail, simulating an outage.
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        fn check_available(&self) -> Result<()> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(AppError::service_unavailable("usage store offline"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl UsageStore for InMemoryUsageStore {
        async fn get_usage(&self, group_id: &GroupId, period_start: u64) -> Result<Option<UsageCounter>> {
            self.check_available()?;
            Ok(self
                .counters
                .lock()
                .unwrap()
                .get(&(group_id.as_str().to_string(), period_start))
                .map(|used| UsageCounter { used_credits: *used }))
        }

        async fn try_consume(
            &self,
            group_id: &GroupId,
            period_start: u64,
            credits: u32,
            limit: Option<u32>,
        ) -> Result<ConsumeOutcome> {
            self.check_available()?;
            let mut counters = self.counters.lock().unwrap();
            let used = counters
                .entry((group_id.as_str().to_string(), period_start))
                .or_insert(0);

            let next = used.saturating_add(credits);
            match limit {
                Some(limit) if next > limit => Ok(ConsumeOutcome::Rejected { used: *used }),
                _ => {
                    *used = next;
                    Ok(ConsumeOutcome::Consumed { used: next })
                }
            }
        }
    }
}
