//! Trade handlers

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
};

use super::super::auth::AuthUser;
use super::super::state::AppState;
use super::super::types::{ApiResult, DisputeBody, ProofBody, ok};
use super::parse_id;
use crate::core_types::TradeId;
use crate::desk::TradeView;
use crate::trade::Trade;

/// Trade state with its recorded fact and handoff job
#[utoipa::path(
    get,
    path = "/api/v1/trades/{id}",
    params(("id" = String, Path, description = "Trade ID (ULID)")),
    responses(
        (status = 200, description = "Trade state", content_type = "application/json"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Trade not found")
    ),
    security(("bearer_jwt" = [])),
    tag = "Trades"
)]
pub async fn get_trade(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<TradeView> {
    let id: TradeId = parse_id(&id, "trade")?;
    ok(state.desk.trade_state(id, user_id).await?)
}

/// Buyer attaches the fiat payment proof reference
#[utoipa::path(
    post,
    path = "/api/v1/trades/{id}/payment-proof",
    params(("id" = String, Path, description = "Trade ID (ULID)")),
    request_body(content = String, description = "proof_ref", content_type = "application/json"),
    responses(
        (status = 200, description = "Proof recorded", content_type = "application/json"),
        (status = 409, description = "Proof already submitted or trade not funded")
    ),
    security(("bearer_jwt" = [])),
    tag = "Trades"
)]
pub async fn submit_payment_proof(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<ProofBody>,
) -> ApiResult<Trade> {
    let id: TradeId = parse_id(&id, "trade")?;
    ok(state
        .desk
        .payments
        .submit_proof(id, user_id, body.proof_ref)
        .await?)
}

/// Seller confirms fiat receipt; release follows when the gate allows
#[utoipa::path(
    post,
    path = "/api/v1/trades/{id}/confirm-payment",
    params(("id" = String, Path, description = "Trade ID (ULID)")),
    responses(
        (status = 200, description = "Receipt confirmed", content_type = "application/json"),
        (status = 409, description = "No proof submitted")
    ),
    security(("bearer_jwt" = [])),
    tag = "Trades"
)]
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Trade> {
    let id: TradeId = parse_id(&id, "trade")?;
    ok(state.desk.confirm_receipt(id, user_id).await?)
}

/// Cancel before funding. Either party.
#[utoipa::path(
    post,
    path = "/api/v1/trades/{id}/cancel",
    params(("id" = String, Path, description = "Trade ID (ULID)")),
    responses(
        (status = 200, description = "Trade cancelled", content_type = "application/json"),
        (status = 409, description = "Trade already funded")
    ),
    security(("bearer_jwt" = [])),
    tag = "Trades"
)]
pub async fn cancel_trade(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Trade> {
    let id: TradeId = parse_id(&id, "trade")?;
    ok(state.desk.release.cancel(id, user_id).await?)
}

/// Escalate a funded trade to operator review
#[utoipa::path(
    post,
    path = "/api/v1/trades/{id}/dispute",
    params(("id" = String, Path, description = "Trade ID (ULID)")),
    request_body(content = String, description = "reason", content_type = "application/json"),
    responses(
        (status = 200, description = "Dispute raised", content_type = "application/json"),
        (status = 409, description = "Trade cannot be disputed")
    ),
    security(("bearer_jwt" = [])),
    tag = "Trades"
)]
pub async fn raise_dispute(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<DisputeBody>,
) -> ApiResult<Trade> {
    let id: TradeId = parse_id(&id, "trade")?;
    ok(state
        .desk
        .payments
        .raise_dispute(id, user_id, body.reason)
        .await?)
}
