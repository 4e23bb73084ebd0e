//! Entitlement resolution for metered imports.
//!
//! Answers one question: may this group run a "magic import" from this source
//! type right now? The decision is split in two:
//!
//! - [`compute_entitlement`] is a pure function over explicit snapshots
//!   (subscription row, usage counter, override flag, clock reading).
//! - [`EntitlementResolver`] performs the two store reads and hands the
//!   snapshots to it.
//!
//! The resolver never writes. Credits are debited afterwards by the import
//! pipeline through [`UsageStore::try_consume`].
//!
//! ```rust,ignore
//! let resolver = EntitlementResolver::new(subscriptions, usage, overrides, rules);
//! let request = EntitlementRequest::parse("grp_123", "url", "user_1", Some("cook@example.com"))?;
//! let status = resolver.resolve_entitlement(&request).await?;
//! if !status.allowed {
//!     return Err(AppError::PaymentRequired { .. });
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BillingResult;
use super::costs::{SourceCostTable, SourceType};
use super::error::BillingError;
use super::overrides::OverridePolicy;
use super::period::{Clock, SystemClock, accounting_period_start, unix_seconds};
use super::plans::{CreditAllowance, PlanCreditTable, PlanTier};
use super::storage::{BillingProvider, StoredSubscription, SubscriptionStore, UsageStore};
use super::validation::GroupId;

/// Machine-readable explanation attached to every decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    OverrideActive,
    UnlimitedPlan,
    GracePeriod,
    SufficientCredits,
    InsufficientCredits,
    NoSubscription,
    /// A store lookup failed; the action is denied.
    EntitlementUnavailable,
}

/// Reason codes in precedence order. The first whose condition holds is
/// reported. The last entry always holds.
pub const REASON_PRECEDENCE: [ReasonCode; 6] = [
    ReasonCode::OverrideActive,
    ReasonCode::UnlimitedPlan,
    ReasonCode::GracePeriod,
    ReasonCode::SufficientCredits,
    ReasonCode::InsufficientCredits,
    ReasonCode::NoSubscription,
];

impl ReasonCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OverrideActive => "override_active",
            Self::UnlimitedPlan => "unlimited_plan",
            Self::GracePeriod => "grace_period",
            Self::SufficientCredits => "sufficient_credits",
            Self::InsufficientCredits => "insufficient_credits",
            Self::NoSubscription => "no_subscription",
            Self::EntitlementUnavailable => "entitlement_unavailable",
        }
    }

    /// Whether this reason describes an allowed decision.
    #[must_use]
    pub fn is_allowing(&self) -> bool {
        matches!(
            self,
            Self::OverrideActive | Self::UnlimitedPlan | Self::GracePeriod | Self::SufficientCredits
        )
    }

    /// Whether this reason's condition holds for `facts`.
    fn applies(&self, facts: &EntitlementFacts) -> bool {
        match self {
            Self::OverrideActive => facts.is_env_override,
            Self::UnlimitedPlan => facts.is_unlimited,
            Self::GracePeriod => facts.grace_active,
            Self::SufficientCredits => facts.remaining_credits.covers(facts.required_credits),
            // An exhausted allotment. A tier with no allotment at all reads as
            // "subscribe to get credits" rather than "out of credits".
            Self::InsufficientCredits => facts.monthly_credits.limit().is_some_and(|m| m > 0),
            Self::NoSubscription => true,
            Self::EntitlementUnavailable => false,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fields a decision is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitlementFacts {
    pub monthly_credits: CreditAllowance,
    pub remaining_credits: CreditAllowance,
    pub required_credits: u32,
    pub grace_active: bool,
    pub is_env_override: bool,
    pub is_unlimited: bool,
}

impl EntitlementFacts {
    /// `unlimited OR override OR grace OR remaining >= required`. No other
    /// path yields `true`.
    #[must_use]
    pub fn allowed(&self) -> bool {
        self.is_unlimited
            || self.is_env_override
            || self.grace_active
            || self.remaining_credits.covers(self.required_credits)
    }

    /// First matching entry of [`REASON_PRECEDENCE`].
    #[must_use]
    pub fn reason_code(&self) -> ReasonCode {
        REASON_PRECEDENCE
            .into_iter()
            .find(|reason| reason.applies(self))
            .unwrap_or(ReasonCode::NoSubscription)
    }
}

/// Computed entitlement for one group and source type. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[must_use]
pub struct EntitlementStatus {
    pub group_id: GroupId,
    pub source_type: SourceType,
    pub plan_tier: PlanTier,
    pub monthly_credits: CreditAllowance,
    pub used_credits: u32,
    pub remaining_credits: CreditAllowance,
    pub required_credits: u32,
    pub allowed: bool,
    pub reason_code: ReasonCode,
    /// Start of the accounting period (Unix seconds).
    pub period_start: u64,
    pub has_active_subscription: bool,
    pub grace_active: bool,
    pub is_env_override: bool,
    pub is_unlimited: bool,
}

impl EntitlementStatus {
    #[must_use]
    pub fn facts(&self) -> EntitlementFacts {
        EntitlementFacts {
            monthly_credits: self.monthly_credits,
            remaining_credits: self.remaining_credits,
            required_credits: self.required_credits,
            grace_active: self.grace_active,
            is_env_override: self.is_env_override,
            is_unlimited: self.is_unlimited,
        }
    }

    /// Limit to pass to [`UsageStore::try_consume`] when debiting this
    /// decision. `None` when the decision was not credit-bounded.
    #[must_use]
    pub fn consumption_limit(&self) -> Option<u32> {
        if self.is_unlimited || self.is_env_override || self.grace_active {
            return None;
        }
        self.monthly_credits.limit()
    }
}

/// Static rules the decision is computed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementRules {
    /// Tier for groups without an active subscription.
    pub free_tier: PlanTier,
    /// Tier for groups with an active subscription.
    pub subscribed_tier: PlanTier,
    pub plan_credits: PlanCreditTable,
    pub source_costs: SourceCostTable,
}

impl EntitlementRules {
    /// Fail fast on a broken credit or cost table.
    pub fn validate(&self) -> BillingResult<()> {
        self.plan_credits.validate()?;
        self.source_costs.validate()?;
        self.plan_credits.monthly_credits(self.free_tier)?;
        self.plan_credits.monthly_credits(self.subscribed_tier)?;
        Ok(())
    }
}

impl Default for EntitlementRules {
    fn default() -> Self {
        Self {
            free_tier: PlanTier::Free,
            subscribed_tier: PlanTier::Pro,
            plan_credits: PlanCreditTable::default(),
            source_costs: SourceCostTable::default(),
        }
    }
}

/// Snapshots gathered from the collaborators for one decision.
#[derive(Debug, Clone, Copy)]
pub struct EntitlementSnapshot<'a> {
    pub subscription: Option<&'a StoredSubscription>,
    pub used_credits: u32,
    pub period_start: u64,
    pub override_granted: bool,
    pub now: DateTime<Utc>,
}

/// Compute an entitlement from explicit inputs.
///
/// # Errors
///
/// Only configuration errors (a missing cost or credit entry). Rules that
/// passed [`EntitlementRules::validate`] never fail here.
pub fn compute_entitlement(
    rules: &EntitlementRules,
    group_id: &GroupId,
    source_type: SourceType,
    snapshot: EntitlementSnapshot<'_>,
) -> BillingResult<EntitlementStatus> {
    let has_active_subscription = snapshot.subscription.is_some_and(StoredSubscription::is_active);
    let grace_active = snapshot
        .subscription
        .is_some_and(|sub| sub.in_grace_period(unix_seconds(snapshot.now)));

    let plan_tier = if snapshot.override_granted {
        PlanTier::Unlimited
    } else if has_active_subscription {
        rules.subscribed_tier
    } else {
        rules.free_tier
    };

    let monthly_credits = rules.plan_credits.monthly_credits(plan_tier)?;
    let is_unlimited = monthly_credits.is_unlimited();
    let remaining_credits = match monthly_credits {
        CreditAllowance::Limited(monthly) => {
            CreditAllowance::Limited(monthly.saturating_sub(snapshot.used_credits))
        }
        CreditAllowance::Unlimited => CreditAllowance::Unlimited,
    };
    let required_credits = rules.source_costs.cost_of(source_type)?;

    let facts = EntitlementFacts {
        monthly_credits,
        remaining_credits,
        required_credits,
        grace_active,
        is_env_override: snapshot.override_granted,
        is_unlimited,
    };

    Ok(EntitlementStatus {
        group_id: group_id.clone(),
        source_type,
        plan_tier,
        monthly_credits,
        used_credits: snapshot.used_credits,
        remaining_credits,
        required_credits,
        allowed: facts.allowed(),
        reason_code: facts.reason_code(),
        period_start: snapshot.period_start,
        has_active_subscription,
        grace_active,
        is_env_override: snapshot.override_granted,
        is_unlimited,
    })
}

/// A validated entitlement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementRequest {
    pub group_id: GroupId,
    pub source_type: SourceType,
    pub user_id: String,
    /// Only used for override allow-listing.
    pub user_email: Option<String>,
}

impl EntitlementRequest {
    /// Validate raw inputs. Invalid input is rejected here, before any
    /// resolution work.
    pub fn parse(
        group_id: &str,
        source_type: &str,
        user_id: impl Into<String>,
        user_email: Option<&str>,
    ) -> BillingResult<Self> {
        Ok(Self {
            group_id: GroupId::parse(group_id)?,
            source_type: source_type.parse()?,
            user_id: user_id.into(),
            user_email: user_email
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
        })
    }
}

/// Resolves entitlements by reading the subscription and usage stores.
///
/// Performs at most two sequential reads per call with no caching and no
/// retries; a failed read is returned immediately as
/// `BillingError::UpstreamUnavailable`.
pub struct EntitlementResolver<S: SubscriptionStore, U: UsageStore, O: OverridePolicy> {
    subscriptions: S,
    usage: U,
    overrides: O,
    rules: EntitlementRules,
    provider: BillingProvider,
    clock: Arc<dyn Clock>,
}

impl<S: SubscriptionStore, U: UsageStore, O: OverridePolicy> EntitlementResolver<S, U, O> {
    /// Create a resolver using the system clock and the default provider.
    #[must_use]
    pub fn new(subscriptions: S, usage: U, overrides: O, rules: EntitlementRules) -> Self {
        Self {
            subscriptions,
            usage,
            overrides,
            rules,
            provider: BillingProvider::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the billing provider subscription rows are looked up under.
    #[must_use]
    pub fn with_provider(mut self, provider: BillingProvider) -> Self {
        self.provider = provider;
        self
    }

    #[must_use]
    pub fn rules(&self) -> &EntitlementRules {
        &self.rules
    }

    /// Access the usage store (used by the admission flow to debit credits).
    pub fn usage_store(&self) -> &U {
        &self.usage
    }

    /// Resolve the entitlement for a request.
    ///
    /// # Errors
    ///
    /// - `BillingError::UpstreamUnavailable` when either store read fails. The
    ///   caller must deny the action.
    /// - A configuration error if the rules were never validated.
    pub async fn resolve_entitlement(
        &self,
        request: &EntitlementRequest,
    ) -> BillingResult<EntitlementStatus> {
        let group_id = &request.group_id;
        let now = self.clock.now();

        let subscription = self
            .subscriptions
            .get_subscription(group_id, self.provider)
            .await
            .map_err(|e| {
                tracing::warn!(
                    target: "mealplan::billing",
                    group_id = %group_id,
                    provider = %self.provider,
                    error = %e,
                    "Subscription lookup failed, denying metered action"
                );
                BillingError::upstream("subscription", e)
            })?;

        let period_start = accounting_period_start(subscription.as_ref(), now);

        let used_credits = self
            .usage
            .get_usage(group_id, period_start)
            .await
            .map_err(|e| {
                tracing::warn!(
                    target: "mealplan::billing",
                    group_id = %group_id,
                    period_start,
                    error = %e,
                    "Usage lookup failed, denying metered action"
                );
                BillingError::upstream("usage", e)
            })?
            .map(|counter| counter.used_credits)
            .unwrap_or(0);

        let override_granted = self
            .overrides
            .is_override_granted(group_id, request.user_email.as_deref());

        let status = compute_entitlement(
            &self.rules,
            group_id,
            request.source_type,
            EntitlementSnapshot {
                subscription: subscription.as_ref(),
                used_credits,
                period_start,
                override_granted,
                now,
            },
        )?;

        tracing::debug!(
            target: "mealplan::billing",
            group_id = %group_id,
            user_id = %request.user_id,
            source_type = %request.source_type,
            plan_tier = %status.plan_tier,
            used_credits = status.used_credits,
            remaining_credits = %status.remaining_credits,
            required_credits = status.required_credits,
            allowed = status.allowed,
            reason_code = %status.reason_code,
            "Entitlement resolved"
        );

        Ok(status)
    }
}
