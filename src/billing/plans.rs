//! Plan tiers and their monthly credit allotments.
//!
//! ```rust,ignore
//! use mealplan_entitlements::billing::{PlanCreditTable, PlanTier};
//!
//! let credits = PlanCreditTable::new()
//!     .with_credits(PlanTier::Free, 5)
//!     .with_credits(PlanTier::Pro, 100);
//! credits.validate()?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use super::BillingResult;
use super::error::BillingError;

/// Default monthly credits for the free tier.
pub const DEFAULT_FREE_CREDITS: u32 = 5;

/// Default monthly credits for the pro tier.
pub const DEFAULT_PRO_CREDITS: u32 = 100;

/// Subscription plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    /// No subscription, or a subscription that is no longer active.
    Free,
    /// Paid subscription with a monthly credit allotment.
    Pro,
    /// Never metered.
    Unlimited,
}

impl PlanTier {
    /// All tiers, in ascending order.
    pub const ALL: [PlanTier; 3] = [Self::Free, Self::Pro, Self::Unlimited];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Unlimited => "unlimited",
        }
    }

    /// Whether usage on this tier is counted against an allotment.
    #[must_use]
    pub fn is_metered(&self) -> bool {
        !matches!(self, Self::Unlimited)
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "unlimited" => Ok(Self::Unlimited),
            other => Err(BillingError::InvalidPlanTable {
                message: format!("unknown plan tier '{}'", other),
            }),
        }
    }
}

/// A credit quantity that may be unbounded.
///
/// Serializes as a number, or as the string `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditAllowance {
    Limited(u32),
    Unlimited,
}

impl CreditAllowance {
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// The finite amount, if any.
    #[must_use]
    pub fn limit(&self) -> Option<u32> {
        match self {
            Self::Limited(n) => Some(*n),
            Self::Unlimited => None,
        }
    }

    /// Whether `required` credits fit in this allowance.
    #[must_use]
    pub fn covers(&self, required: u32) -> bool {
        match self {
            Self::Limited(n) => *n >= required,
            Self::Unlimited => true,
        }
    }
}

impl fmt::Display for CreditAllowance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{}", n),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

impl Serialize for CreditAllowance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Limited(n) => serializer.serialize_u32(*n),
            Self::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

/// Monthly credit allotment per metered tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanCreditTable {
    credits: BTreeMap<PlanTier, u32>,
}

impl PlanCreditTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            credits: BTreeMap::new(),
        }
    }

    /// Set the monthly credits for a tier.
    #[must_use]
    pub fn with_credits(mut self, tier: PlanTier, credits: u32) -> Self {
        self.credits.insert(tier, credits);
        self
    }

    /// Monthly credits for a tier.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidPlanTable` when a metered tier has no
    /// entry. `validate()` at startup rules this out.
    pub fn monthly_credits(&self, tier: PlanTier) -> BillingResult<CreditAllowance> {
        if !tier.is_metered() {
            return Ok(CreditAllowance::Unlimited);
        }

        self.credits
            .get(&tier)
            .copied()
            .map(CreditAllowance::Limited)
            .ok_or_else(|| BillingError::InvalidPlanTable {
                message: format!("no monthly credits configured for tier '{}'", tier),
            })
    }

    /// Check that every metered tier has an entry and the unlimited tier has none.
    pub fn validate(&self) -> BillingResult<()> {
        for tier in PlanTier::ALL.iter().filter(|t| t.is_metered()) {
            if !self.credits.contains_key(tier) {
                return Err(BillingError::InvalidPlanTable {
                    message: format!("missing monthly credits for tier '{}'", tier),
                });
            }
        }

        if self.credits.contains_key(&PlanTier::Unlimited) {
            return Err(BillingError::InvalidPlanTable {
                message: "the unlimited tier cannot carry a credit allotment".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for PlanCreditTable {
    fn default() -> Self {
        Self::new()
            .with_credits(PlanTier::Free, DEFAULT_FREE_CREDITS)
            .with_credits(PlanTier::Pro, DEFAULT_PRO_CREDITS)
    }
}
