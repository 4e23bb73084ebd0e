use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::billing::{
    AllowListOverridePolicy, BillingProvider, BillingResult, EntitlementRules, PlanCreditTable,
    PlanTier, PortalConfig, SourceCostTable, SourceType,
};
use crate::error::AppError;
use crate::utils::{get_env_list, get_env_with_prefix};

/// Main configuration for the entitlement service
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub billing: BillingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Billing rules and provider settings.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Tier for groups without an active subscription.
    pub free_tier: PlanTier,
    /// Tier for groups with an active subscription.
    pub subscribed_tier: PlanTier,
    pub plan_credits: PlanCreditTable,
    pub source_costs: SourceCostTable,
    /// Emails granted unlimited imports.
    pub override_emails: Vec<String>,
    /// Groups granted unlimited imports.
    pub override_group_ids: Vec<String>,
    pub stripe_secret_key: Option<SecretString>,
    pub provider: BillingProvider,
    pub portal_configuration_id: Option<String>,
    pub portal_return_domains: Vec<String>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            free_tier: PlanTier::Free,
            subscribed_tier: PlanTier::Pro,
            plan_credits: PlanCreditTable::default(),
            source_costs: SourceCostTable::default(),
            override_emails: Vec::new(),
            override_group_ids: Vec::new(),
            stripe_secret_key: None,
            provider: BillingProvider::default(),
            portal_configuration_id: None,
            portal_return_domains: Vec::new(),
        }
    }
}

impl BillingConfig {
    /// The entitlement rules this configuration describes.
    #[must_use]
    pub fn rules(&self) -> EntitlementRules {
        EntitlementRules {
            free_tier: self.free_tier,
            subscribed_tier: self.subscribed_tier,
            plan_credits: self.plan_credits.clone(),
            source_costs: self.source_costs.clone(),
        }
    }

    /// Build the override allow-list.
    pub fn override_policy(&self) -> BillingResult<AllowListOverridePolicy> {
        AllowListOverridePolicy::new(&self.override_emails, &self.override_group_ids)
    }

    #[must_use]
    pub fn portal_config(&self) -> PortalConfig {
        let config = PortalConfig {
            provider: self.provider,
            ..PortalConfig::new()
        }
        .allowed_return_domains(self.portal_return_domains.iter().cloned());

        match &self.portal_configuration_id {
            Some(id) => config.configuration_id(id.clone()),
            None => config,
        }
    }

    /// Whether provider credentials are present.
    #[must_use]
    pub fn provider_configured(&self) -> bool {
        self.stripe_secret_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().trim().is_empty())
    }
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
    env_errors: Vec<String>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            env_errors: Vec::new(),
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_billing(mut self, billing: BillingConfig) -> Self {
        self.config.billing = billing;
        self
    }

    pub fn with_tiers(mut self, free_tier: PlanTier, subscribed_tier: PlanTier) -> Self {
        self.config.billing.free_tier = free_tier;
        self.config.billing.subscribed_tier = subscribed_tier;
        self
    }

    pub fn with_monthly_credits(mut self, tier: PlanTier, credits: u32) -> Self {
        self.config.billing.plan_credits = self.config.billing.plan_credits.with_credits(tier, credits);
        self
    }

    pub fn with_source_cost(mut self, source_type: SourceType, credits: u32) -> Self {
        self.config.billing.source_costs = self.config.billing.source_costs.with_cost(source_type, credits);
        self
    }

    pub fn with_override_emails<I, T>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.config.billing.override_emails = emails.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_override_group_ids<I, T>(mut self, group_ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.config.billing.override_group_ids = group_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stripe_secret_key(mut self, key: impl Into<String>) -> Self {
        self.config.billing.stripe_secret_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn from_env(mut self) -> Self {
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }

        if let Some(tier) = get_env_with_prefix("BILLING_FREE_TIER") {
            match tier.parse() {
                Ok(tier) => self.config.billing.free_tier = tier,
                Err(e) => self.env_errors.push(format!("BILLING_FREE_TIER: {}", e)),
            }
        }
        if let Some(tier) = get_env_with_prefix("BILLING_SUBSCRIBED_TIER") {
            match tier.parse() {
                Ok(tier) => self.config.billing.subscribed_tier = tier,
                Err(e) => self.env_errors.push(format!("BILLING_SUBSCRIBED_TIER: {}", e)),
            }
        }

        for (key, tier) in [("BILLING_CREDITS_FREE", PlanTier::Free), ("BILLING_CREDITS_PRO", PlanTier::Pro)] {
            if let Some(credits) = self.env_u32(key) {
                self = self.with_monthly_credits(tier, credits);
            }
        }

        for (key, source_type) in [
            ("BILLING_COST_TEXT", SourceType::Text),
            ("BILLING_COST_URL", SourceType::Url),
            ("BILLING_COST_IMAGE", SourceType::Image),
        ] {
            if let Some(credits) = self.env_u32(key) {
                self = self.with_source_cost(source_type, credits);
            }
        }

        if let Some(emails) = get_env_list("BILLING_UNLIMITED_EMAILS") {
            self.config.billing.override_emails = emails;
        }
        if let Some(group_ids) = get_env_list("BILLING_UNLIMITED_GROUP_IDS") {
            self.config.billing.override_group_ids = group_ids;
        }

        if let Some(key) = get_env_with_prefix("STRIPE_SECRET_KEY") {
            self.config.billing.stripe_secret_key = Some(SecretString::from(key));
        }
        if let Some(id) = get_env_with_prefix("BILLING_PORTAL_CONFIGURATION_ID") {
            self.config.billing.portal_configuration_id = Some(id);
        }
        if let Some(domains) = get_env_list("BILLING_PORTAL_RETURN_DOMAINS") {
            self.config.billing.portal_return_domains = domains;
        }

        self
    }

    fn env_u32(&mut self, key: &str) -> Option<u32> {
        let raw = get_env_with_prefix(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.env_errors
                    .push(format!("{}: expected a non-negative integer, got '{}'", key, raw));
                None
            }
        }
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration is invalid:
    /// - Unparseable environment values
    /// - Invalid log level
    /// - A zero or missing source cost
    /// - A metered tier without a credit entry
    /// - A blank or malformed override entry
    pub fn build(self) -> crate::error::Result<Config> {
        if let Some(first) = self.env_errors.first() {
            return Err(AppError::internal(format!("Invalid environment configuration: {}", first)));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(AppError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        self.config.billing.rules().validate()?;
        self.config.billing.override_policy()?;

        if !self.config.billing.provider_configured() {
            tracing::warn!(
                target: "mealplan::billing",
                "No billing provider key configured, billing management is disabled"
            );
        }

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
