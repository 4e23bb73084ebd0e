use std::sync::Arc;

use crate::billing::{
    BillingAuditLogger, BillingResult, Clock, EntitlementResolver, ImportAdmission, OverridePolicy,
    PortalClient, PortalManager, SubscriptionStore, SystemClock, TracingAuditLogger, UsageStore,
};
use crate::config::BillingConfig;

pub type DynSubscriptionStore = Arc<dyn SubscriptionStore>;
pub type DynUsageStore = Arc<dyn UsageStore>;
pub type DynOverridePolicy = Arc<dyn OverridePolicy>;
pub type DynPortalClient = Arc<dyn PortalClient>;

pub type DynImportAdmission = ImportAdmission<DynSubscriptionStore, DynUsageStore, DynOverridePolicy>;
pub type DynPortalManager = PortalManager<DynSubscriptionStore, DynPortalClient>;

/// Shared state for the billing routes.
#[derive(Clone)]
pub struct BillingState {
    pub admission: Arc<DynImportAdmission>,
    pub portal: Arc<DynPortalManager>,
    pub provider_configured: bool,
}

impl BillingState {
    #[must_use]
    pub fn builder(
        config: BillingConfig,
        subscriptions: DynSubscriptionStore,
        usage: DynUsageStore,
        portal_client: DynPortalClient,
    ) -> BillingStateBuilder {
        BillingStateBuilder {
            config,
            subscriptions,
            usage,
            portal_client,
            clock: Arc::new(SystemClock),
            audit_logger: Arc::new(TracingAuditLogger),
        }
    }
}

/// Wires the collaborators into a [`BillingState`].
#[must_use = "builder does nothing until you call build()"]
pub struct BillingStateBuilder {
    config: BillingConfig,
    subscriptions: DynSubscriptionStore,
    usage: DynUsageStore,
    portal_client: DynPortalClient,
    clock: Arc<dyn Clock>,
    audit_logger: Arc<dyn BillingAuditLogger>,
}

impl BillingStateBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn audit_logger(mut self, logger: Arc<dyn BillingAuditLogger>) -> Self {
        self.audit_logger = logger;
        self
    }

    /// # Errors
    ///
    /// Configuration errors from the rules or the override allow-list.
    pub fn build(self) -> BillingResult<BillingState> {
        let rules = self.config.rules();
        rules.validate()?;
        let overrides: DynOverridePolicy = Arc::new(self.config.override_policy()?);

        let resolver = EntitlementResolver::new(self.subscriptions.clone(), self.usage, overrides, rules)
            .with_provider(self.config.provider)
            .with_clock(self.clock);

        let admission = ImportAdmission::new(Arc::new(resolver)).with_audit_logger(self.audit_logger.clone());
        let portal = PortalManager::new(self.subscriptions, self.portal_client, self.config.portal_config())
            .with_audit_logger(self.audit_logger);

        Ok(BillingState {
            admission: Arc::new(admission),
            portal: Arc::new(portal),
            provider_configured: self.config.provider_configured(),
        })
    }
}
