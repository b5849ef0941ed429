//! Vendor job handlers
//!
//! The verification code only ever leaves in responses to the customer.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
};

use super::super::auth::AuthUser;
use super::super::state::AppState;
use super::super::types::{
    ApiResult, CompleteJobBody, ConfirmJobPaymentBody, SubmitJobPaymentBody, ok,
};
use super::parse_id;
use crate::core_types::VendorJobId;
use crate::vendor::VendorJob;

#[utoipa::path(
    get,
    path = "/api/v1/vendor-jobs/{id}",
    params(("id" = String, Path, description = "Vendor job ID (ULID)")),
    responses(
        (status = 200, description = "Vendor job", content_type = "application/json"),
        (status = 403, description = "Not a participant")
    ),
    security(("bearer_jwt" = [])),
    tag = "Vendor Jobs"
)]
pub async fn get_vendor_job(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<VendorJob> {
    let id: VendorJobId = parse_id(&id, "vendor job")?;
    ok(state.desk.vendors.get(id, user_id).await?)
}

/// Payer reports the fiat transfer to the vendor
#[utoipa::path(
    post,
    path = "/api/v1/vendor-jobs/{id}/submit-payment",
    params(("id" = String, Path, description = "Vendor job ID (ULID)")),
    request_body(content = String, description = "reference", content_type = "application/json"),
    responses(
        (status = 200, description = "Payment submitted", content_type = "application/json"),
        (status = 409, description = "Job not awaiting payment")
    ),
    security(("bearer_jwt" = [])),
    tag = "Vendor Jobs"
)]
pub async fn submit_job_payment(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<SubmitJobPaymentBody>,
) -> ApiResult<VendorJob> {
    let id: VendorJobId = parse_id(&id, "vendor job")?;
    ok(state
        .desk
        .vendors
        .submit_payment(id, user_id, body.reference)
        .await?)
}

/// Vendor confirms the fiat arrived
#[utoipa::path(
    post,
    path = "/api/v1/vendor-jobs/{id}/confirm-payment",
    params(("id" = String, Path, description = "Vendor job ID (ULID)")),
    request_body(content = String, description = "amount_received (decimal string), bank_reference", content_type = "application/json"),
    responses(
        (status = 200, description = "Payment confirmed", content_type = "application/json"),
        (status = 403, description = "Not the assigned vendor")
    ),
    security(("bearer_jwt" = [])),
    tag = "Vendor Jobs"
)]
pub async fn confirm_job_payment(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<ConfirmJobPaymentBody>,
) -> ApiResult<VendorJob> {
    let id: VendorJobId = parse_id(&id, "vendor job")?;
    ok(state
        .desk
        .vendors
        .confirm_payment(id, user_id, body.amount_received, body.bank_reference)
        .await?)
}

#[utoipa::path(
    post,
    path = "/api/v1/vendor-jobs/{id}/start",
    params(("id" = String, Path, description = "Vendor job ID (ULID)")),
    responses(
        (status = 200, description = "Handoff started", content_type = "application/json"),
        (status = 409, description = "Payment not confirmed")
    ),
    security(("bearer_jwt" = [])),
    tag = "Vendor Jobs"
)]
pub async fn start_vendor_job(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<VendorJob> {
    let id: VendorJobId = parse_id(&id, "vendor job")?;
    ok(state.desk.vendors.start_handoff(id, user_id).await?)
}

/// Close the handoff with the customer's verification code
#[utoipa::path(
    post,
    path = "/api/v1/vendor-jobs/{id}/complete",
    params(("id" = String, Path, description = "Vendor job ID (ULID)")),
    request_body(content = String, description = "code", content_type = "application/json"),
    responses(
        (status = 200, description = "Handoff completed", content_type = "application/json"),
        (status = 400, description = "Wrong code"),
        (status = 422, description = "Verification locked")
    ),
    security(("bearer_jwt" = [])),
    tag = "Vendor Jobs"
)]
pub async fn complete_vendor_job(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<CompleteJobBody>,
) -> ApiResult<VendorJob> {
    let id: VendorJobId = parse_id(&id, "vendor job")?;
    ok(state
        .desk
        .vendors
        .complete_with_code(id, user_id, &body.code)
        .await?)
}
