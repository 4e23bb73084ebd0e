//! Billing HTTP routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::identity::CallerIdentity;
use super::state::BillingState;
use crate::billing::{
    Admission, BillingCtas, EntitlementRequest, EntitlementStatus, GroupId, PortalSession, ReasonCode,
    can_manage_billing, decide_ctas,
};
use crate::error::{AppError, Result};

/// Build the billing router.
///
/// - `GET /billing/groups/{group_id}/entitlement?source_type=`
/// - `POST /imports/admission`
/// - `POST /billing/groups/{group_id}/portal`
pub fn billing_routes(state: BillingState) -> Router {
    Router::new()
        .route("/billing/groups/{group_id}/entitlement", get(get_entitlement))
        .route("/billing/groups/{group_id}/portal", post(create_portal_session))
        .route("/imports/admission", post(admit_import))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct EntitlementQuery {
    pub source_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EntitlementResponse {
    pub entitlement: EntitlementStatus,
    pub ctas: BillingCtas,
}

async fn get_entitlement(
    State(state): State<BillingState>,
    caller: CallerIdentity,
    Path(group_id): Path<String>,
    Query(query): Query<EntitlementQuery>,
) -> Result<Json<EntitlementResponse>> {
    let source_type = query
        .source_type
        .ok_or_else(|| AppError::bad_request("source_type is required"))?;
    let request = EntitlementRequest::parse(&group_id, &source_type, &caller.user_id, caller.email.as_deref())?;

    let entitlement = state.admission.resolver().resolve_entitlement(&request).await?;
    let can_manage = can_manage_billing(caller.group_role.as_deref(), state.provider_configured);
    let ctas = decide_ctas(&entitlement, can_manage);

    Ok(Json(EntitlementResponse { entitlement, ctas }))
}

#[derive(Debug, Deserialize)]
pub struct AdmissionBody {
    pub group_id: String,
    pub source_type: String,
}

/// Admission outcome. Denials answer 402, or 503 when billing state could
/// not be read.
#[derive(Debug, Serialize)]
pub struct AdmissionResponse {
    pub admitted: bool,
    pub reason_code: ReasonCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entitlement: Option<EntitlementStatus>,
}

impl From<Admission> for AdmissionResponse {
    fn from(admission: Admission) -> Self {
        match admission {
            Admission::Admitted(status) => Self {
                admitted: true,
                reason_code: status.reason_code,
                entitlement: Some(status),
            },
            Admission::Denied { reason_code, status } => Self {
                admitted: false,
                reason_code,
                entitlement: status,
            },
        }
    }
}

impl IntoResponse for AdmissionResponse {
    fn into_response(self) -> Response {
        let status = match (self.admitted, self.reason_code) {
            (true, _) => StatusCode::OK,
            (false, ReasonCode::EntitlementUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            (false, _) => StatusCode::PAYMENT_REQUIRED,
        };
        (status, Json(self)).into_response()
    }
}

async fn admit_import(
    State(state): State<BillingState>,
    caller: CallerIdentity,
    Json(body): Json<AdmissionBody>,
) -> Result<AdmissionResponse> {
    let request = EntitlementRequest::parse(
        &body.group_id,
        &body.source_type,
        &caller.user_id,
        caller.email.as_deref(),
    )?;

    let admission = state.admission.admit(&request).await?;
    Ok(admission.into())
}

#[derive(Debug, Deserialize)]
pub struct PortalBody {
    pub return_url: String,
}

async fn create_portal_session(
    State(state): State<BillingState>,
    caller: CallerIdentity,
    Path(group_id): Path<String>,
    Json(body): Json<PortalBody>,
) -> Result<Json<PortalSession>> {
    let group_id = GroupId::parse(group_id)?;
    let can_manage = can_manage_billing(caller.group_role.as_deref(), state.provider_configured);

    let session = state
        .portal
        .create_portal_session(&group_id, &body.return_url, can_manage)
        .await?;

    Ok(Json(session))
}
