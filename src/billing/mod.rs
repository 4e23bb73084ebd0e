//! Billing entitlements for metered recipe imports.
//!
//! Decides whether a group may run a "magic import" from a given source type,
//! reports remaining monthly credits, and picks which billing prompts the UI
//! should show.
//!
//! # Example
//!
//! ```rust,ignore
//! use mealplan_entitlements::billing::{
//!     EntitlementRequest, EntitlementResolver, EntitlementRules, ImportAdmission,
//! };
//!
//! let rules = EntitlementRules::default();
//! rules.validate()?;
//!
//! let resolver = Arc::new(EntitlementResolver::new(subscriptions, usage, overrides, rules));
//! let admission = ImportAdmission::new(resolver);
//!
//! let request = EntitlementRequest::parse("grp_123", "image", user_id, Some(email))?;
//! let status = admission.admit(&request).await?.into_result()?;
//!
//! run_import().await?;
//! admission.record_consumption(&status).await?;
//! ```

pub mod admission;
pub mod audit;
pub mod costs;
pub mod cta;
pub mod entitlements;
pub mod error;
pub mod overrides;
pub mod period;
pub mod plans;
pub mod portal;
pub mod storage;
pub mod validation;

pub use admission::{Admission, ImportAdmission};
pub use audit::{BillingAuditEvent, BillingAuditLogger, NoOpAuditLogger, TracingAuditLogger};
pub use costs::{SourceCostTable, SourceType};
pub use cta::{BillingCtas, CtaInputs, can_manage_billing, decide_ctas};
pub use entitlements::{
    EntitlementFacts, EntitlementRequest, EntitlementResolver, EntitlementRules, EntitlementSnapshot,
    EntitlementStatus, REASON_PRECEDENCE, ReasonCode, compute_entitlement,
};
pub use error::BillingError;
pub use overrides::{AllowListOverridePolicy, OverridePolicy};
pub use period::{Clock, FixedClock, SystemClock, accounting_period_start, calendar_month_start};
pub use plans::{CreditAllowance, PlanCreditTable, PlanTier};
pub use portal::{CreatePortalSessionRequest, PortalClient, PortalConfig, PortalManager, PortalSession};
pub use storage::{
    BillingProvider, ConsumeOutcome, StoredSubscription, SubscriptionStatus, SubscriptionStore,
    UsageCounter, UsageStore,
};
pub use validation::GroupId;

/// Result type for billing operations.
pub type BillingResult<T> = std::result::Result<T, BillingError>;

#[cfg(any(test, feature = "test-billing"))]
pub use audit::test::RecordingAuditLogger;
#[cfg(any(test, feature = "test-billing"))]
pub use portal::test::MockPortalClient;
#[cfg(any(test, feature = "test-billing"))]
pub use storage::test::{InMemorySubscriptionStore, InMemoryUsageStore};
