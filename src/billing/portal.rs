//! Customer portal session management.
//!
//! Sends billing managers to the provider's hosted portal to change plans,
//! payment methods or cancel.

use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

use super::BillingResult;
use super::audit::{BillingAuditEvent, BillingAuditLogger, NoOpAuditLogger};
use super::error::BillingError;
use super::storage::{BillingProvider, SubscriptionStore};
use super::validation::GroupId;
use crate::error::Result;

/// Customer portal session management.
pub struct PortalManager<S: SubscriptionStore, C: PortalClient> {
    subscriptions: S,
    client: C,
    config: PortalConfig,
    audit_logger: Arc<dyn BillingAuditLogger>,
}

impl<S: SubscriptionStore, C: PortalClient> PortalManager<S, C> {
    #[must_use]
    pub fn new(subscriptions: S, client: C, config: PortalConfig) -> Self {
        Self {
            subscriptions,
            client,
            config,
            audit_logger: Arc::new(NoOpAuditLogger),
        }
    }

    /// Set the audit logger.
    #[must_use]
    pub fn with_audit_logger(mut self, logger: Arc<dyn BillingAuditLogger>) -> Self {
        self.audit_logger = logger;
        self
    }

    /// Create a customer portal session.
    ///
    /// `can_manage` is the caller's billing capability, see
    /// [`can_manage_billing`](super::cta::can_manage_billing).
    ///
    /// # Errors
    ///
    /// - `BillingNotPermitted` when `can_manage` is false
    /// - `InvalidReturnUrl` / `ReturnDomainNotAllowed` for a bad return URL
    /// - `NoCustomer` when the group has never subscribed
    /// - `UpstreamUnavailable` when the store or the portal client fails
    pub async fn create_portal_session(
        &self,
        group_id: &GroupId,
        return_url: &str,
        can_manage: bool,
    ) -> BillingResult<PortalSession> {
        if !can_manage {
            return Err(BillingError::BillingNotPermitted {
                group_id: group_id.to_string(),
            });
        }

        self.config.validate_return_url(return_url)?;

        let subscription = self
            .subscriptions
            .get_subscription(group_id, self.config.provider)
            .await
            .map_err(|e| BillingError::upstream("subscription", e))?;

        let customer_id = subscription
            .map(|sub| sub.provider_customer_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BillingError::NoCustomer {
                group_id: group_id.to_string(),
            })?;

        let session = self
            .client
            .create_portal_session(CreatePortalSessionRequest {
                customer_id,
                return_url: return_url.to_string(),
                configuration_id: self.config.configuration_id.clone(),
            })
            .await
            .map_err(|e| {
                tracing::warn!(
                    target: "mealplan::billing",
                    group_id = %group_id,
                    error = %e,
                    "Portal session creation failed"
                );
                BillingError::upstream("portal", e)
            })?;

        self.audit_logger
            .log(BillingAuditEvent::PortalSessionCreated {
                group_id: group_id.to_string(),
                session_id: session.id.clone(),
            })
            .await;

        Ok(session)
    }
}

/// Configuration for the customer portal.
#[derive(Debug, Clone, Default)]
pub struct PortalConfig {
    /// Provider portal configuration ID. Uses the provider default if unset.
    pub configuration_id: Option<String>,
    /// Allowed return URL domains. Empty allows any HTTPS host.
    pub allowed_return_domains: Vec<String>,
    pub provider: BillingProvider,
}

impl PortalConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn configuration_id(mut self, id: impl Into<String>) -> Self {
        self.configuration_id = Some(id.into());
        self
    }

    /// Restrict return URLs to these domains and their subdomains.
    ///
    /// Domains are lowercased to match the host `Url` produces.
    #[must_use]
    pub fn allowed_return_domains<I, T>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.allowed_return_domains = domains
            .into_iter()
            .map(|domain| domain.into().trim().to_ascii_lowercase())
            .filter(|domain| !domain.is_empty())
            .collect();
        self
    }

    /// Check that a return URL is HTTPS and, when a domain list is
    /// configured, points at an allowed host.
    pub fn validate_return_url(&self, return_url: &str) -> BillingResult<()> {
        let parsed = Url::parse(return_url).map_err(|e| BillingError::InvalidReturnUrl {
            url: return_url.to_string(),
            reason: e.to_string(),
        })?;

        if parsed.scheme() != "https" {
            return Err(BillingError::InvalidReturnUrl {
                url: return_url.to_string(),
                reason: "must use HTTPS".to_string(),
            });
        }

        if self.allowed_return_domains.is_empty() {
            return Ok(());
        }

        let host = parsed.host_str().ok_or_else(|| BillingError::InvalidReturnUrl {
            url: return_url.to_string(),
            reason: "missing host".to_string(),
        })?;

        let allowed = self
            .allowed_return_domains
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{}", domain)));

        if allowed {
            Ok(())
        } else {
            Err(BillingError::ReturnDomainNotAllowed {
                domain: host.to_string(),
            })
        }
    }
}

/// Portal session response.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[must_use]
pub struct PortalSession {
    /// Provider portal session ID.
    pub id: String,
    /// URL to redirect the customer to.
    pub url: String,
}

/// Request to create a portal session.
#[derive(Debug, Clone)]
pub struct CreatePortalSessionRequest {
    pub customer_id: String,
    pub return_url: String,
    pub configuration_id: Option<String>,
}

/// Provider portal operations.
#[async_trait]
pub trait PortalClient: Send + Sync {
    async fn create_portal_session(&self, request: CreatePortalSessionRequest) -> Result<PortalSession>;
}

#[async_trait]
impl<T: PortalClient + ?Sized> PortalClient for Arc<T> {
    async fn create_portal_session(&self, request: CreatePortalSessionRequest) -> Result<PortalSession> {
        (**self).create_portal_session(request).await
    }
}

/// Mock portal client for testing.
#[cfg(any(test, feature = "test-billing"))]
pub mod test {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Mock portal client that records the customers it was called for.
    #[derive(Default)]
    pub struct MockPortalClient {
        session_counter: AtomicU64,
        customers: Mutex<Vec<String>>,
        failing: AtomicBool,
    }

    impl MockPortalClient {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Customer IDs passed to the client so far.
        pub fn customers(&self) -> Vec<String> {
            self.customers.lock().unwrap().clone()
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PortalClient for MockPortalClient {
        async fn create_portal_session(&self, request: CreatePortalSessionRequest) -> Result<PortalSession> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::service_unavailable("portal provider offline"));
            }
            self.customers.lock().unwrap().push(request.customer_id);
            let id = format!("bps_test_{}", self.session_counter.fetch_add(1, Ordering::SeqCst));
            Ok(PortalSession {
                url: format!("https://billing.stripe.com/p/session/{}", id),
                id,
            })
        }
    }
}
