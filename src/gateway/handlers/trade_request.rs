//! Trade request (offer) handlers

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};

use super::super::auth::AuthUser;
use super::super::state::AppState;
use super::super::types::{AcceptBody, ApiResult, ok};
use super::parse_id;
use crate::core_types::TradeRequestId;
use crate::trade::{AcceptOutcome, NewTradeRequest, RequestFilter, TradeRequest};

/// Open a new buy or sell offer
#[utoipa::path(
    post,
    path = "/api/v1/trade-requests",
    request_body(content = String, description = "Offer: direction, asset_type, asset_amount, fiat_amount, rate, payment_method, receiving_address, handoff, candidate_ids, notes", content_type = "application/json"),
    responses(
        (status = 200, description = "Offer opened", content_type = "application/json"),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Authentication failed")
    ),
    security(("bearer_jwt" = [])),
    tag = "Trade Requests"
)]
pub async fn create_trade_request(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(spec): Json<NewTradeRequest>,
) -> ApiResult<TradeRequest> {
    ok(state.desk.registry.create(user_id, spec).await?)
}

/// Live offers the caller can accept
#[utoipa::path(
    get,
    path = "/api/v1/trade-requests",
    params(
        ("direction" = Option<String>, Query, description = "buy or sell"),
        ("asset_type" = Option<String>, Query, description = "BTC, ETH or USDT"),
        ("payment_method" = Option<String>, Query, description = "Payment method filter")
    ),
    responses(
        (status = 200, description = "Open offers", content_type = "application/json"),
        (status = 401, description = "Authentication failed")
    ),
    security(("bearer_jwt" = [])),
    tag = "Trade Requests"
)]
pub async fn list_trade_requests(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(filter): Query<RequestFilter>,
) -> ApiResult<Vec<TradeRequest>> {
    ok(state.desk.registry.list_open(user_id, &filter).await?)
}

/// Every offer the caller opened
#[utoipa::path(
    get,
    path = "/api/v1/trade-requests/mine",
    responses(
        (status = 200, description = "Caller's offers", content_type = "application/json"),
        (status = 401, description = "Authentication failed")
    ),
    security(("bearer_jwt" = [])),
    tag = "Trade Requests"
)]
pub async fn my_trade_requests(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Vec<TradeRequest>> {
    ok(state.desk.registry.list_mine(user_id).await?)
}

/// Accept an offer. Exactly one concurrent caller wins.
#[utoipa::path(
    post,
    path = "/api/v1/trade-requests/{id}/accept",
    params(("id" = String, Path, description = "Trade request ID (ULID)")),
    request_body(content = String, description = "Optional receiving_address", content_type = "application/json"),
    responses(
        (status = 200, description = "Trade opened", content_type = "application/json"),
        (status = 409, description = "Offer already taken"),
        (status = 410, description = "Offer expired")
    ),
    security(("bearer_jwt" = [])),
    tag = "Trade Requests"
)]
pub async fn accept_trade_request(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Option<Json<AcceptBody>>,
) -> ApiResult<AcceptOutcome> {
    let id: TradeRequestId = parse_id(&id, "trade request")?;
    let receiving_address = body.and_then(|Json(b)| b.receiving_address);

    let mut outcome = state
        .desk
        .matching
        .accept(id, user_id, receiving_address)
        .await?;
    outcome.vendor_job = outcome.vendor_job.map(|job| job.visible_to(user_id));
    ok(outcome)
}

/// Hide an offer from the caller
#[utoipa::path(
    post,
    path = "/api/v1/trade-requests/{id}/decline",
    params(("id" = String, Path, description = "Trade request ID (ULID)")),
    responses(
        (status = 200, description = "Offer declined", content_type = "application/json"),
        (status = 404, description = "Offer not found")
    ),
    security(("bearer_jwt" = [])),
    tag = "Trade Requests"
)]
pub async fn decline_trade_request(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let id: TradeRequestId = parse_id(&id, "trade request")?;
    state.desk.matching.decline(id, user_id).await?;
    ok(())
}

/// Withdraw an open offer. Requester only.
#[utoipa::path(
    post,
    path = "/api/v1/trade-requests/{id}/cancel",
    params(("id" = String, Path, description = "Trade request ID (ULID)")),
    responses(
        (status = 200, description = "Offer cancelled", content_type = "application/json"),
        (status = 403, description = "Not the requester"),
        (status = 409, description = "Offer already accepted")
    ),
    security(("bearer_jwt" = [])),
    tag = "Trade Requests"
)]
pub async fn cancel_trade_request(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<TradeRequest> {
    let id: TradeRequestId = parse_id(&id, "trade request")?;
    ok(state.desk.registry.cancel(id, user_id).await?)
}
