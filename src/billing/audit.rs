//! Audit logging for metered-import billing decisions.
//!
//! Tracks admissions, denials, debits and portal access for support and
//! abuse investigation.

use async_trait::async_trait;
use std::fmt;

/// Audit event types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingAuditEvent {
    /// An import passed the entitlement check.
    ImportAdmitted {
        group_id: String,
        source_type: String,
        reason_code: String,
    },
    /// An import was denied.
    ImportDenied {
        group_id: String,
        source_type: String,
        reason_code: String,
    },
    /// Credits were debited after a successful import.
    CreditsConsumed {
        group_id: String,
        credits: u32,
        used_total: u32,
    },
    /// A debit was refused because it would exceed the allotment.
    OverspendRejected {
        group_id: String,
        credits: u32,
        used_total: u32,
    },
    /// Portal session created.
    PortalSessionCreated {
        group_id: String,
        session_id: String,
    },
}

impl fmt::Display for BillingAuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImportAdmitted { group_id, source_type, reason_code } => {
                write!(f, "Import admitted: group={}, source={}, reason={}", group_id, source_type, reason_code)
            }
            Self::ImportDenied { group_id, source_type, reason_code } => {
                write!(f, "Import denied: group={}, source={}, reason={}", group_id, source_type, reason_code)
            }
            Self::CreditsConsumed { group_id, credits, used_total } => {
                write!(f, "Credits consumed: group={}, credits={}, used_total={}", group_id, credits, used_total)
            }
            Self::OverspendRejected { group_id, credits, used_total } => {
                write!(f, "Overspend rejected: group={}, credits={}, used_total={}", group_id, credits, used_total)
            }
            Self::PortalSessionCreated { group_id, session_id } => {
                write!(f, "Portal session created: group={}, session={}", group_id, session_id)
            }
        }
    }
}

/// Trait for audit logging backends.
#[async_trait]
pub trait BillingAuditLogger: Send + Sync {
    /// Log a billing audit event.
    ///
    /// Implementations must not fail the billing operation.
    async fn log(&self, event: BillingAuditEvent);
}

/// No-op audit logger.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuditLogger;

#[async_trait]
impl BillingAuditLogger for NoOpAuditLogger {
    async fn log(&self, _event: BillingAuditEvent) {}
}

/// Tracing-based audit logger.
///
/// Logs audit events at INFO level under the `mealplan::billing::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl BillingAuditLogger for TracingAuditLogger {
    async fn log(&self, event: BillingAuditEvent) {
        tracing::info!(
            target: "mealplan::billing::audit",
            event_type = %event_kind(&event),
            "{}", event
        );
    }
}

/// Get the event kind as a string for structured logging.
fn event_kind(event: &BillingAuditEvent) -> &'static str {
    match event {
        BillingAuditEvent::ImportAdmitted { .. } => "import_admitted",
        BillingAuditEvent::ImportDenied { .. } => "import_denied",
        BillingAuditEvent::CreditsConsumed { .. } => "credits_consumed",
        BillingAuditEvent::OverspendRejected { .. } => "overspend_rejected",
        BillingAuditEvent::PortalSessionCreated { .. } => "portal_session_created",
    }
}

#[cfg(any(test, feature = "test-billing"))]
pub mod test {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Audit logger that captures events.
    #[derive(Default, Clone)]
    pub struct RecordingAuditLogger {
        events: Arc<Mutex<Vec<BillingAuditEvent>>>,
    }

    impl RecordingAuditLogger {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn events(&self) -> Vec<BillingAuditEvent> {
            self.events.lock().await.clone()
        }
    }

    #[async_trait]
    impl BillingAuditLogger for RecordingAuditLogger {
        async fn log(&self, event: BillingAuditEvent) {
            self.events.lock().await.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::RecordingAuditLogger;
    use super::*;

    #[tokio::test]
    async fn test_noop_logger() {
        NoOpAuditLogger
            .log(BillingAuditEvent::PortalSessionCreated {
                group_id: "grp_1".to_string(),
                session_id: "bps_1".to_string(),
            })
            .await;
    }

    #[tokio::test]
    async fn test_recording_logger() {
        let logger = RecordingAuditLogger::new();

        logger
            .log(BillingAuditEvent::ImportDenied {
                group_id: "grp_1".to_string(),
                source_type: "url".to_string(),
                reason_code: "insufficient_credits".to_string(),
            })
            .await;
        logger
            .log(BillingAuditEvent::CreditsConsumed {
                group_id: "grp_1".to_string(),
                credits: 1,
                used_total: 4,
            })
            .await;

        let events = logger.events().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], BillingAuditEvent::ImportDenied { .. }));
        assert!(matches!(events[1], BillingAuditEvent::CreditsConsumed { .. }));
    }

    #[test]
    fn test_event_display_and_kind() {
        let event = BillingAuditEvent::OverspendRejected {
            group_id: "grp_9".to_string(),
            credits: 2,
            used_total: 5,
        };
        let display = event.to_string();
        assert!(display.contains("grp_9"));
        assert!(display.contains("used_total=5"));
        assert_eq!(event_kind(&event), "overspend_rejected");
    }
}
