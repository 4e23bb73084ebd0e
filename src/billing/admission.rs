//! Import admission and credit consumption.
//!
//! The import pipeline calls [`ImportAdmission::admit`] before running a
//! metered import and [`ImportAdmission::record_consumption`] after it
//! succeeds. Admission only reads; the debit is a conditional write that
//! refuses to push the counter past the allotment.

use std::sync::Arc;

use super::BillingResult;
use super::audit::{BillingAuditEvent, BillingAuditLogger, NoOpAuditLogger};
use super::entitlements::{EntitlementRequest, EntitlementResolver, EntitlementStatus, ReasonCode};
use super::error::BillingError;
use super::overrides::OverridePolicy;
use super::storage::{ConsumeOutcome, SubscriptionStore, UsageStore};

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Admission {
    /// The import may run.
    Admitted(EntitlementStatus),
    /// The import must not run. `status` is absent when no entitlement could
    /// be computed.
    Denied {
        reason_code: ReasonCode,
        status: Option<EntitlementStatus>,
    },
}

impl Admission {
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }

    #[must_use]
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Self::Admitted(status) => status.reason_code,
            Self::Denied { reason_code, .. } => *reason_code,
        }
    }

    /// Convert a denial into `BillingError::ImportBlocked`.
    pub fn into_result(self) -> BillingResult<EntitlementStatus> {
        match self {
            Self::Admitted(status) => Ok(status),
            Self::Denied { reason_code, .. } => Err(BillingError::ImportBlocked {
                reason_code: reason_code.as_str(),
            }),
        }
    }
}

/// Admission gate in front of the import pipeline.
pub struct ImportAdmission<S: SubscriptionStore, U: UsageStore, O: OverridePolicy> {
    resolver: Arc<EntitlementResolver<S, U, O>>,
    audit_logger: Arc<dyn BillingAuditLogger>,
}

impl<S: SubscriptionStore, U: UsageStore, O: OverridePolicy> ImportAdmission<S, U, O> {
    #[must_use]
    pub fn new(resolver: Arc<EntitlementResolver<S, U, O>>) -> Self {
        Self {
            resolver,
            audit_logger: Arc::new(NoOpAuditLogger),
        }
    }

    /// Set the audit logger.
    #[must_use]
    pub fn with_audit_logger(mut self, logger: Arc<dyn BillingAuditLogger>) -> Self {
        self.audit_logger = logger;
        self
    }

    #[must_use]
    pub fn resolver(&self) -> &EntitlementResolver<S, U, O> {
        &self.resolver
    }

    /// Decide whether an import may run.
    ///
    /// A store outage is a denial with `entitlement_unavailable`, never an
    /// error.
    ///
    /// # Errors
    ///
    /// Only configuration errors from unvalidated rules.
    pub async fn admit(&self, request: &EntitlementRequest) -> BillingResult<Admission> {
        let admission = match self.resolver.resolve_entitlement(request).await {
            Ok(status) if status.allowed => Admission::Admitted(status),
            Ok(status) => Admission::Denied {
                reason_code: status.reason_code,
                status: Some(status),
            },
            Err(BillingError::UpstreamUnavailable { .. }) => Admission::Denied {
                reason_code: ReasonCode::EntitlementUnavailable,
                status: None,
            },
            Err(e) => return Err(e),
        };

        let group_id = request.group_id.to_string();
        let source_type = request.source_type.to_string();
        let reason_code = admission.reason_code().to_string();

        let event = if admission.is_admitted() {
            BillingAuditEvent::ImportAdmitted {
                group_id,
                source_type,
                reason_code,
            }
        } else {
            tracing::info!(
                target: "mealplan::billing",
                group_id = %request.group_id,
                user_id = %request.user_id,
                source_type = %request.source_type,
                reason_code = %reason_code,
                "Import denied"
            );
            BillingAuditEvent::ImportDenied {
                group_id,
                source_type,
                reason_code,
            }
        };
        self.audit_logger.log(event).await;

        Ok(admission)
    }

    /// Debit the credits for an import admitted with `status`.
    ///
    /// Returns `ConsumeOutcome::Rejected` when a concurrent import already
    /// spent the credits this one was admitted against.
    ///
    /// # Errors
    ///
    /// `BillingError::UpstreamUnavailable` when the usage store fails.
    pub async fn record_consumption(&self, status: &EntitlementStatus) -> BillingResult<ConsumeOutcome> {
        let credits = status.required_credits;
        let outcome = self
            .resolver
            .usage_store()
            .try_consume(&status.group_id, status.period_start, credits, status.consumption_limit())
            .await
            .map_err(|e| {
                tracing::warn!(
                    target: "mealplan::billing",
                    group_id = %status.group_id,
                    period_start = status.period_start,
                    credits,
                    error = %e,
                    "Credit debit failed"
                );
                BillingError::upstream("usage", e)
            })?;

        let group_id = status.group_id.to_string();
        let event = match outcome {
            ConsumeOutcome::Consumed { used } => BillingAuditEvent::CreditsConsumed {
                group_id,
                credits,
                used_total: used,
            },
            ConsumeOutcome::Rejected { used } => {
                tracing::warn!(
                    target: "mealplan::billing",
                    group_id = %status.group_id,
                    credits,
                    used_credits = used,
                    "Credit debit rejected, allotment exhausted concurrently"
                );
                BillingAuditEvent::OverspendRejected {
                    group_id,
                    credits,
                    used_total: used,
                }
            }
        };
        self.audit_logger.log(event).await;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::audit::test::RecordingAuditLogger;
    use crate::billing::entitlements::EntitlementRules;
    use crate::billing::overrides::AllowListOverridePolicy;
    use crate::billing::period::{FixedClock, calendar_month_start, unix_seconds};
    use crate::billing::storage::test::{InMemorySubscriptionStore, InMemoryUsageStore};
    use crate::billing::validation::GroupId;
    use chrono::{TimeZone, Utc};

    type TestAdmission = ImportAdmission<InMemorySubscriptionStore, InMemoryUsageStore, AllowListOverridePolicy>;

    const NOW: i64 = 1_773_000_000;

    fn group() -> GroupId {
        GroupId::parse("grp_admit").unwrap()
    }

    fn period_start() -> u64 {
        unix_seconds(calendar_month_start(Utc.timestamp_opt(NOW, 0).unwrap()))
    }

    fn setup(
        subs: InMemorySubscriptionStore,
        usage: InMemoryUsageStore,
        overrides: AllowListOverridePolicy,
    ) -> (TestAdmission, RecordingAuditLogger) {
        let resolver = EntitlementResolver::new(subs, usage, overrides, EntitlementRules::default())
            .with_clock(Arc::new(FixedClock::at_timestamp(NOW)));
        let logger = RecordingAuditLogger::new();
        let admission = ImportAdmission::new(Arc::new(resolver)).with_audit_logger(Arc::new(logger.clone()));
        (admission, logger)
    }

    fn request(source: &str) -> EntitlementRequest {
        EntitlementRequest::parse("grp_admit", source, "user_1", None).unwrap()
    }

    #[tokio::test]
    async fn test_admit_and_consume() {
        let usage = InMemoryUsageStore::new();
        let (admission, logger) = setup(InMemorySubscriptionStore::new(), usage.clone(), AllowListOverridePolicy::empty());

        let status = admission.admit(&request("image")).await.unwrap().into_result().unwrap();
        assert_eq!(status.reason_code, ReasonCode::SufficientCredits);

        let outcome = admission.record_consumption(&status).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::Consumed { used: 2 });
        assert_eq!(usage.used(&group(), period_start()), 2);

        let events = logger.events().await;
        assert!(matches!(events[0], BillingAuditEvent::ImportAdmitted { .. }));
        assert!(matches!(events[1], BillingAuditEvent::CreditsConsumed { credits: 2, used_total: 2, .. }));
    }

    #[tokio::test]
    async fn test_exhausted_allotment_is_denied() {
        let usage = InMemoryUsageStore::new();
        usage.set_usage(&group(), period_start(), 5);
        let (admission, logger) = setup(InMemorySubscriptionStore::new(), usage, AllowListOverridePolicy::empty());

        let admission = admission.admit(&request("url")).await.unwrap();
        assert!(!admission.is_admitted());
        assert_eq!(admission.reason_code(), ReasonCode::InsufficientCredits);
        assert!(matches!(admission, Admission::Denied { status: Some(_), .. }));

        let err = admission.into_result().unwrap_err();
        assert_eq!(err.reason_code(), Some("insufficient_credits"));
        assert!(matches!(logger.events().await[0], BillingAuditEvent::ImportDenied { .. }));
    }

    #[tokio::test]
    async fn test_outage_fails_closed() {
        let subs = InMemorySubscriptionStore::new();
        subs.set_unavailable(true);
        let (admission, _) = setup(subs, InMemoryUsageStore::new(), AllowListOverridePolicy::empty());

        let admission = admission.admit(&request("text")).await.unwrap();
        assert_eq!(
            admission,
            Admission::Denied {
                reason_code: ReasonCode::EntitlementUnavailable,
                status: None,
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_debit_rejected_at_limit() {
        let usage = InMemoryUsageStore::new();
        usage.set_usage(&group(), period_start(), 4);
        let (admission, logger) = setup(InMemorySubscriptionStore::new(), usage.clone(), AllowListOverridePolicy::empty());

        // Both imports see one remaining credit.
        let first = admission.admit(&request("text")).await.unwrap().into_result().unwrap();
        let second = admission.admit(&request("text")).await.unwrap().into_result().unwrap();

        assert!(admission.record_consumption(&first).await.unwrap().is_consumed());
        let outcome = admission.record_consumption(&second).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::Rejected { used: 5 });
        assert_eq!(usage.used(&group(), period_start()), 5);

        let events = logger.events().await;
        assert!(matches!(events.last(), Some(BillingAuditEvent::OverspendRejected { .. })));
    }

    #[tokio::test]
    async fn test_override_debit_has_no_limit() {
        let usage = InMemoryUsageStore::new();
        usage.set_usage(&group(), period_start(), 50);
        let overrides = AllowListOverridePolicy::new(Vec::<String>::new(), ["grp_admit"]).unwrap();
        let (admission, _) = setup(InMemorySubscriptionStore::new(), usage.clone(), overrides);

        let status = admission.admit(&request("image")).await.unwrap().into_result().unwrap();
        assert_eq!(status.consumption_limit(), None);
        assert_eq!(
            admission.record_consumption(&status).await.unwrap(),
            ConsumeOutcome::Consumed { used: 52 }
        );
    }

    #[tokio::test]
    async fn test_debit_during_outage_is_upstream_error() {
        let usage = InMemoryUsageStore::new();
        let (admission, _) = setup(InMemorySubscriptionStore::new(), usage.clone(), AllowListOverridePolicy::empty());
        let status = admission.admit(&request("text")).await.unwrap().into_result().unwrap();

        usage.set_unavailable(true);
        let err = admission.record_consumption(&status).await.unwrap_err();
        assert!(matches!(err, BillingError::UpstreamUnavailable { store: "usage", .. }));
    }
}
