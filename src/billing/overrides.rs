//! Configuration-driven unlimited-access overrides.
//!
//! Internal and testing accounts are granted unlimited imports without a paid
//! subscription by listing their email or group in the environment.

use std::collections::HashSet;

use super::BillingResult;
use super::error::BillingError;
use super::validation::{GroupId, normalize_email, validate_group_id};

/// Decides whether a group/user pair bypasses billing.
pub trait OverridePolicy: Send + Sync {
    fn is_override_granted(&self, group_id: &GroupId, user_email: Option<&str>) -> bool;
}

impl<T: OverridePolicy + ?Sized> OverridePolicy for std::sync::Arc<T> {
    fn is_override_granted(&self, group_id: &GroupId, user_email: Option<&str>) -> bool {
        (**self).is_override_granted(group_id, user_email)
    }
}

/// Allow-list override policy.
///
/// Emails compare case-insensitively after trimming; group IDs compare exactly.
#[derive(Debug, Clone, Default)]
pub struct AllowListOverridePolicy {
    emails: HashSet<String>,
    group_ids: HashSet<String>,
}

impl AllowListOverridePolicy {
    /// Build from raw allow-list entries.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidOverrideEntry` for a blank email, an email
    /// without `@`, or a malformed group ID.
    pub fn new<E, G>(emails: E, group_ids: G) -> BillingResult<Self>
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        G: IntoIterator,
        G::Item: AsRef<str>,
    {
        let mut policy = Self::default();

        for email in emails {
            let normalized = normalize_email(email.as_ref());
            if normalized.is_empty() || !normalized.contains('@') {
                return Err(BillingError::InvalidOverrideEntry {
                    entry: email.as_ref().to_string(),
                });
            }
            policy.emails.insert(normalized);
        }

        for group_id in group_ids {
            let raw = group_id.as_ref().trim();
            validate_group_id(raw).map_err(|_| BillingError::InvalidOverrideEntry {
                entry: raw.to_string(),
            })?;
            policy.group_ids.insert(raw.to_string());
        }

        Ok(policy)
    }

    /// A policy that grants nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.group_ids.is_empty()
    }
}

impl OverridePolicy for AllowListOverridePolicy {
    fn is_override_granted(&self, group_id: &GroupId, user_email: Option<&str>) -> bool {
        if self.group_ids.contains(group_id.as_str()) {
            return true;
        }

        user_email
            .map(normalize_email)
            .is_some_and(|email| !email.is_empty() && self.emails.contains(&email))
    }
}
