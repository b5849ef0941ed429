//! Custodian deposit callback
//!
//! Authenticated with a shared token in `X-Callback-Token`, not a user JWT.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
};
use subtle::ConstantTimeEq;

use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, DepositAck, DepositCallbackBody, ok};

pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

/// Deposit observed on an escrow address; triggers an immediate funding poll
#[utoipa::path(
    post,
    path = "/internal/custodian/deposit",
    request_body(content = String, description = "address", content_type = "application/json"),
    responses(
        (status = 200, description = "Deposit applied", content_type = "application/json"),
        (status = 401, description = "Bad callback token"),
        (status = 404, description = "Unknown escrow address")
    ),
    tag = "Internal"
)]
pub async fn deposit_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<DepositCallbackBody>,
) -> ApiResult<DepositAck> {
    let expected = state
        .callback_token
        .as_deref()
        .ok_or_else(|| ApiError::unauthorized("Deposit callbacks disabled"))?;
    let given = headers
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !bool::from(given.as_bytes().ct_eq(expected.as_bytes())) {
        tracing::warn!("Deposit callback rejected: bad token");
        return Err(ApiError::unauthorized("Invalid callback token"));
    }

    let trade = state.desk.escrow.on_deposit_callback(&body.address).await?;
    ok(DepositAck {
        trade_id: trade.id,
        status: trade.status.to_string(),
    })
}
