//! Caller identity forwarded by the upstream auth layer.
//!
//! Session verification happens before requests reach this service; the
//! gateway forwards the verified user as headers.

use crate::error::AppError;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use std::future::Future;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const GROUP_ROLE_HEADER: &str = "x-group-role";

/// The authenticated caller.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(caller: CallerIdentity) -> String {
///     caller.user_id
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub email: Option<String>,
    /// The caller's role in the target group (`owner`, `admin`, `member`).
    pub group_role: Option<String>,
}

impl CallerIdentity {
    /// Read the identity headers.
    ///
    /// # Errors
    ///
    /// `AppError::Unauthorized` when the user ID header is missing or blank.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let user_id = header_value(headers, USER_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized("Missing authenticated user"))?;

        Ok(Self {
            user_id,
            email: header_value(headers, USER_EMAIL_HEADER),
            group_role: header_value(headers, GROUP_ROLE_HEADER),
        })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        std::future::ready(Self::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_identity_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("user_1"));
        headers.insert(USER_EMAIL_HEADER, HeaderValue::from_static(" cook@example.com "));
        headers.insert(GROUP_ROLE_HEADER, HeaderValue::from_static("owner"));

        let identity = CallerIdentity::from_headers(&headers).unwrap();
        assert_eq!(identity.user_id, "user_1");
        assert_eq!(identity.email.as_deref(), Some("cook@example.com"));
        assert_eq!(identity.group_role.as_deref(), Some("owner"));
    }

    #[test]
    fn test_missing_user_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("   "));

        let err = CallerIdentity::from_headers(&headers).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
