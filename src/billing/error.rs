//! Billing-specific error types.
//!
//! Three families: invalid input (rejected before resolution), configuration
//! errors (fatal at startup), and upstream failures (fail-closed at the
//! boundary with `entitlement_unavailable`).

use std::fmt;

/// Billing-specific errors.
///
/// These convert to [`AppError`](crate::AppError) for HTTP responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    // Input errors
    /// The group ID is malformed.
    InvalidGroupId { id: String, reason: String },
    /// The import source type is not one of `text`, `url`, `image`.
    UnknownSourceType { value: String },
    /// The portal return URL is malformed or not HTTPS.
    InvalidReturnUrl { url: String, reason: String },
    /// The portal return URL's domain is not in the allowed list.
    ReturnDomainNotAllowed { domain: String },

    // Configuration errors
    /// The cost table has no entry for a source type.
    MissingSourceCost { source_type: String },
    /// A cost table entry is zero.
    NonPositiveSourceCost { source_type: String },
    /// The plan credit table is malformed.
    InvalidPlanTable { message: String },
    /// An override allow-list entry is blank or malformed.
    InvalidOverrideEntry { entry: String },

    // Upstream errors
    /// The subscription or usage store could not be read.
    UpstreamUnavailable { store: &'static str, message: String },

    // Decision errors
    /// The metered action is blocked by billing state.
    ImportBlocked { reason_code: &'static str },
    /// No provider customer is linked to the group.
    NoCustomer { group_id: String },
    /// The caller may not manage billing for this group.
    BillingNotPermitted { group_id: String },
}

impl fmt::Display for BillingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGroupId { id, reason } => {
                write!(f, "Invalid group ID '{}': {}", id, reason)
            }
            Self::UnknownSourceType { value } => {
                write!(f, "Unknown import source type '{}' (expected text, url or image)", value)
            }
            Self::InvalidReturnUrl { url, reason } => {
                write!(f, "Invalid return URL '{}': {}", url, reason)
            }
            Self::ReturnDomainNotAllowed { domain } => {
                write!(f, "Return URL domain '{}' is not allowed", domain)
            }
            Self::MissingSourceCost { source_type } => {
                write!(f, "No credit cost configured for source type '{}'", source_type)
            }
            Self::NonPositiveSourceCost { source_type } => {
                write!(f, "Credit cost for source type '{}' must be greater than 0", source_type)
            }
            Self::InvalidPlanTable { message } => {
                write!(f, "Invalid plan credit table: {}", message)
            }
            Self::InvalidOverrideEntry { entry } => {
                write!(f, "Invalid override allow-list entry '{}'", entry)
            }
            Self::UpstreamUnavailable { store, message } => {
                write!(f, "Entitlement unavailable: {} store failed: {}", store, message)
            }
            Self::ImportBlocked { reason_code } => {
                write!(f, "Import blocked: {}", reason_code)
            }
            Self::NoCustomer { group_id } => {
                write!(f, "No billing customer found for group '{}'", group_id)
            }
            Self::BillingNotPermitted { group_id } => {
                write!(f, "Not permitted to manage billing for group '{}'", group_id)
            }
        }
    }
}

impl std::error::Error for BillingError {}

impl From<BillingError> for crate::error::AppError {
    fn from(err: BillingError) -> Self {
        use crate::error::AppError;

        match &err {
            BillingError::InvalidGroupId { .. }
            | BillingError::UnknownSourceType { .. }
            | BillingError::InvalidReturnUrl { .. }
            | BillingError::ReturnDomainNotAllowed { .. } => AppError::BadRequest(err.to_string()),

            BillingError::MissingSourceCost { .. }
            | BillingError::NonPositiveSourceCost { .. }
            | BillingError::InvalidPlanTable { .. }
            | BillingError::InvalidOverrideEntry { .. } => AppError::Internal(err.to_string()),

            BillingError::UpstreamUnavailable { .. } => AppError::ServiceUnavailable {
                message: err.to_string(),
                reason_code: err.reason_code(),
            },

            BillingError::ImportBlocked { reason_code } => AppError::PaymentRequired {
                message: err.to_string(),
                reason_code: *reason_code,
            },

            BillingError::NoCustomer { .. } => AppError::NotFound(err.to_string()),

            BillingError::BillingNotPermitted { .. } => AppError::Forbidden(err.to_string()),
        }
    }
}

impl BillingError {
    /// Wrap a store failure.
    pub fn upstream(store: &'static str, err: impl fmt::Display) -> Self {
        Self::UpstreamUnavailable {
            store,
            message: err.to_string(),
        }
    }

    /// Check if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidGroupId { .. }
                | Self::UnknownSourceType { .. }
                | Self::InvalidReturnUrl { .. }
                | Self::ReturnDomainNotAllowed { .. }
                | Self::ImportBlocked { .. }
                | Self::NoCustomer { .. }
                | Self::BillingNotPermitted { .. }
        )
    }

    /// Check if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.is_configuration_error() || matches!(self, Self::UpstreamUnavailable { .. })
    }

    /// Check if this error should have been caught by startup validation.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingSourceCost { .. }
                | Self::NonPositiveSourceCost { .. }
                | Self::InvalidPlanTable { .. }
                | Self::InvalidOverrideEntry { .. }
        )
    }

    /// Machine-readable reason for errors that surface as billing denials.
    #[must_use]
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::UpstreamUnavailable { .. } => Some("entitlement_unavailable"),
            Self::ImportBlocked { reason_code } => Some(*reason_code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_error_display() {
        let err = BillingError::UnknownSourceType {
            value: "pdf".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown import source type 'pdf' (expected text, url or image)"
        );

        let err = BillingError::upstream("usage", "connection reset");
        assert_eq!(
            err.to_string(),
            "Entitlement unavailable: usage store failed: connection reset"
        );
    }

    #[test]
    fn test_error_classification() {
        let err = BillingError::InvalidGroupId {
            id: "".to_string(),
            reason: "empty".to_string(),
        };
        assert!(err.is_client_error());
        assert!(!err.is_server_error());

        let err = BillingError::MissingSourceCost {
            source_type: "image".to_string(),
        };
        assert!(err.is_configuration_error());
        assert!(err.is_server_error());
        assert!(!err.is_client_error());

        let err = BillingError::upstream("subscription", "timeout");
        assert!(err.is_server_error());
        assert!(!err.is_configuration_error());
        assert_eq!(err.reason_code(), Some("entitlement_unavailable"));
    }

    #[test]
    fn test_convert_to_app_error() {
        let err: AppError = BillingError::UnknownSourceType {
            value: "fax".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err: AppError = BillingError::upstream("subscription", "timeout").into();
        assert!(matches!(
            err,
            AppError::ServiceUnavailable {
                reason_code: Some("entitlement_unavailable"),
                ..
            }
        ));

        let err: AppError = BillingError::ImportBlocked {
            reason_code: "insufficient_credits",
        }
        .into();
        assert_eq!(err.reason_code(), Some("insufficient_credits"));
        assert_eq!(err.status_code(), axum::http::StatusCode::PAYMENT_REQUIRED);

        let err: AppError = BillingError::BillingNotPermitted {
            group_id: "grp_1".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err: AppError = BillingError::NonPositiveSourceCost {
            source_type: "image".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(err.safe_message(), "Internal server error");
    }
}
