//! Input validation for entitlement requests.
//!
//! Group IDs end up in log lines and store queries, so they are checked before
//! any resolution work starts.

use super::BillingResult;
use super::error::BillingError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for group IDs.
const MAX_GROUP_ID_LENGTH: usize = 256;

/// A validated group identifier.
///
/// Groups are the account boundary that shares one subscription and one
/// usage pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupId(String);

impl GroupId {
    /// Validate and wrap a raw group ID.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidGroupId` if validation fails.
    pub fn parse(id: impl Into<String>) -> BillingResult<Self> {
        let id = id.into();
        validate_group_id(&id)?;
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GroupId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GroupId {
    type Error = BillingError;

    fn try_from(value: String) -> BillingResult<Self> {
        Self::parse(value)
    }
}

impl From<GroupId> for String {
    fn from(id: GroupId) -> Self {
        id.0
    }
}

/// Validate a group ID.
///
/// Group IDs must:
/// - Not be empty
/// - Not exceed 256 characters
/// - Contain only alphanumeric characters, underscores, and hyphens
///
/// UUIDs from the hosted database pass these rules unchanged.
pub fn validate_group_id(id: &str) -> BillingResult<()> {
    if id.is_empty() {
        return Err(BillingError::InvalidGroupId {
            id: id.to_string(),
            reason: "group_id cannot be empty".to_string(),
        });
    }

    if id.len() > MAX_GROUP_ID_LENGTH {
        return Err(BillingError::InvalidGroupId {
            id: truncate_for_error(id),
            reason: format!("group_id exceeds maximum length of {}", MAX_GROUP_ID_LENGTH),
        });
    }

    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(BillingError::InvalidGroupId {
            id: sanitize_for_error(id),
            reason: "group_id contains invalid characters (only alphanumeric, underscore, and hyphen allowed)".to_string(),
        });
    }

    Ok(())
}

/// Normalize an email for allow-list comparison.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn truncate_for_error(s: &str) -> String {
    if s.len() <= 50 {
        s.to_string()
    } else {
        let cut: String = s.chars().take(47).collect();
        format!("{}...", cut)
    }
}

/// Sanitize a string for error messages to prevent log injection.
fn sanitize_for_error(s: &str) -> String {
    let sanitized: String = s
        .chars()
        .take(50)
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '?' })
        .collect();

    if s.chars().count() > 50 {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
