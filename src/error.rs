use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for entitlement services
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The metered action is blocked by billing state.
    #[error("Payment required: {message}")]
    PaymentRequired {
        message: String,
        reason_code: &'static str,
    },

    #[error("Internal server error: {0}")]
    Internal(String),

    /// A collaborator (subscription or usage store) could not be reached.
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        message: String,
        reason_code: Option<&'static str>,
    },
}

/// Standard error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
    error_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason_code: Option<&'static str>,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: msg.into(),
            reason_code: None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PaymentRequired { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Machine-readable reason attached to billing denials, if any.
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::PaymentRequired { reason_code, .. } => Some(*reason_code),
            Self::ServiceUnavailable { reason_code, .. } => *reason_code,
            _ => None,
        }
    }

    /// Returns a message that is safe to show to clients.
    ///
    /// Client errors (4xx) carry their real message. Server errors (5xx) are
    /// replaced with a generic message; the details only go to the logs.
    pub fn safe_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::ServiceUnavailable { .. } => "Service temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request failed"
            );
        } else {
            tracing::debug!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            error: self.safe_message(),
            error_id,
            reason_code: self.reason_code(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::unauthorized("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::internal("x").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::service_unavailable("x").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_safe_message_hides_server_details() {
        let err = AppError::internal("connection string postgres://secret");
        assert_eq!(err.safe_message(), "Internal server error");

        let err = AppError::bad_request("group_id cannot be empty");
        assert_eq!(err.safe_message(), "Bad request: group_id cannot be empty");
    }

    #[test]
    fn test_only_server_errors_are_masked() {
        let errors = [
            AppError::not_found("no customer for grp_1"),
            AppError::bad_request("x"),
            AppError::unauthorized("x"),
            AppError::forbidden("x"),
            AppError::PaymentRequired {
                message: "x".to_string(),
                reason_code: "no_subscription",
            },
            AppError::internal("x"),
            AppError::service_unavailable("x"),
        ];

        for err in errors {
            let masked = err.safe_message() != err.to_string();
            assert_eq!(masked, err.status_code().is_server_error(), "{err}");
        }
    }

    #[test]
    fn test_reason_code() {
        let err = AppError::PaymentRequired {
            message: "out of credits".to_string(),
            reason_code: "insufficient_credits",
        };
        assert_eq!(err.reason_code(), Some("insufficient_credits"));
        assert_eq!(AppError::not_found("x").reason_code(), None);
    }

    #[tokio::test]
    async fn test_into_response_body() {
        let err = AppError::ServiceUnavailable {
            message: "usage store timed out".to_string(),
            reason_code: Some("entitlement_unavailable"),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Service temporarily unavailable");
        assert_eq!(body["reason_code"], "entitlement_unavailable");
        assert!(body["error_id"].is_string());
    }
}
