//! Billing call-to-action selection.
//!
//! Pure mapping from an entitlement to which billing prompts the UI shows.

use serde::{Deserialize, Serialize};

use super::entitlements::EntitlementStatus;

/// Group roles that may manage billing.
const BILLING_MANAGER_ROLES: [&str; 2] = ["owner", "admin"];

/// Which billing prompts to show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingCtas {
    pub show_upgrade: bool,
    pub show_manage: bool,
    pub show_blocked_notice: bool,
}

/// The subset of an entitlement the CTA decision reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtaInputs {
    pub has_active_subscription: bool,
    pub allowed: bool,
    pub is_unlimited: bool,
}

impl From<&EntitlementStatus> for CtaInputs {
    fn from(status: &EntitlementStatus) -> Self {
        Self {
            has_active_subscription: status.has_active_subscription,
            allowed: status.allowed,
            is_unlimited: status.is_unlimited,
        }
    }
}

/// Decide which CTAs to show.
///
/// | can manage | active subscription | upgrade | manage | blocked notice |
/// |---|---|---|---|---|
/// | no  | any | false | false | false |
/// | yes | no  | true  | false | `!allowed && !unlimited` |
/// | yes | yes | false | true  | `!allowed && !unlimited` |
#[must_use]
pub fn decide_ctas(inputs: impl Into<CtaInputs>, can_manage_billing: bool) -> BillingCtas {
    if !can_manage_billing {
        return BillingCtas::default();
    }

    let inputs = inputs.into();
    BillingCtas {
        show_upgrade: !inputs.has_active_subscription,
        show_manage: inputs.has_active_subscription,
        show_blocked_notice: !inputs.allowed && !inputs.is_unlimited,
    }
}

/// Whether a user with `role` in the group may manage billing.
///
/// Requires both a billing-manager role and a configured provider.
#[must_use]
pub fn can_manage_billing(role: Option<&str>, provider_configured: bool) -> bool {
    provider_configured
        && role.is_some_and(|role| {
            let role = role.trim();
            BILLING_MANAGER_ROLES
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(role))
        })
}
