//! Router-level tests: auth, envelope and error mapping over real handlers

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use super::auth::issue_token;
use super::handlers::CALLBACK_TOKEN_HEADER;
use super::types::error_codes;
use super::{AppState, build_router};
use crate::core_types::UserId;
use crate::trade::test_support::{BUYER, BUYER_BTC_ADDRESS, Harness, SELLER};

const SECRET: &str = "gateway-test-secret-gateway-test-secret";
const CALLBACK_TOKEN: &str = "custodian-callback-token";

fn router(h: &Harness) -> Router {
    let state = AppState::new(
        h.desk.clone(),
        SECRET.to_string(),
        Some(CALLBACK_TOKEN.to_string()),
    );
    build_router(Arc::new(state))
}

fn bearer(user: UserId) -> String {
    format!("Bearer {}", issue_token(SECRET, user, 300).unwrap())
}

fn get(uri: &str, user: UserId) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, bearer(user))
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, user: UserId, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, bearer(user))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health_ok() {
    let h = Harness::new();
    let app = router(&h);
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert!(body["data"]["timestamp_ms"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_api_requires_bearer_token() {
    let h = Harness::new();
    let app = router(&h);

    let req = Request::builder()
        .uri("/api/v1/trade-requests")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], error_codes::MISSING_AUTH);

    let req = Request::builder()
        .uri("/api/v1/trade-requests")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], error_codes::AUTH_FAILED);
}

#[tokio::test]
async fn test_offer_to_completion_over_http() {
    let h = Harness::new();
    let app = router(&h);

    let spec = serde_json::to_value(h.sell_spec()).unwrap();
    let (status, body) = send(&app, post("/api/v1/trade-requests", SELLER, spec)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let request_id = body["data"]["id"].as_str().unwrap().to_string();

    // Own offers are not listed to the requester
    let (_, body) = send(&app, get("/api/v1/trade-requests", SELLER)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    let (_, body) = send(&app, get("/api/v1/trade-requests", BUYER)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        post(
            &format!("/api/v1/trade-requests/{request_id}/accept"),
            BUYER,
            json!({ "receiving_address": BUYER_BTC_ADDRESS }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let trade_id = body["data"]["trade"]["id"].as_str().unwrap().to_string();
    let address = body["data"]["trade"]["escrow_address"]
        .as_str()
        .unwrap()
        .to_string();

    // Second accept loses the race
    let (status, body) = send(
        &app,
        post(
            &format!("/api/v1/trade-requests/{request_id}/accept"),
            BUYER + 1,
            json!({ "receiving_address": BUYER_BTC_ADDRESS }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], error_codes::RACE_LOST);

    h.custodian.deposit(&address, h.sell_spec().asset_amount);
    let req = Request::builder()
        .method("POST")
        .uri("/internal/custodian/deposit")
        .header(CALLBACK_TOKEN_HEADER, CALLBACK_TOKEN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "address": address }).to_string()))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "crypto_received");

    let (status, _) = send(
        &app,
        post(
            &format!("/api/v1/trades/{trade_id}/payment-proof"),
            BUYER,
            json!({ "proof_ref": "bank-slip-42" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        post(
            &format!("/api/v1/trades/{trade_id}/payment-proof"),
            BUYER,
            json!({ "proof_ref": "bank-slip-43" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], error_codes::DUPLICATE_PROOF);

    let (status, body) = send(
        &app,
        post(
            &format!("/api/v1/trades/{trade_id}/confirm-payment"),
            SELLER,
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["payment_proof_ref"], "bank-slip-42");

    let (status, _) = send(&app, get(&format!("/api/v1/trades/{trade_id}"), 4242)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_deposit_callback_requires_token() {
    let h = Harness::new();
    let app = router(&h);
    let trade = h.open_trade().await;

    let req = Request::builder()
        .method("POST")
        .uri("/internal/custodian/deposit")
        .header(CALLBACK_TOKEN_HEADER, "guess")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "address": trade.escrow_address }).to_string(),
        ))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method("POST")
        .uri("/internal/custodian/deposit")
        .header(CALLBACK_TOKEN_HEADER, CALLBACK_TOKEN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "address": "bc1qunknown" }).to_string()))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], error_codes::NOT_FOUND);
}

#[tokio::test]
async fn test_vendor_never_sees_code() {
    let h = Harness::new();
    let app = router(&h);
    let (trade, job) = h.open_cash_trade().await;

    let (status, body) = send(
        &app,
        get(&format!("/api/v1/vendor-jobs/{}", job.id), job.vendor_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["verification_code"].is_null());

    let (_, body) = send(
        &app,
        get(&format!("/api/v1/vendor-jobs/{}", job.id), job.customer_id),
    )
    .await;
    assert!(body["data"]["verification_code"].is_string());

    let (_, body) = send(&app, get(&format!("/api/v1/trades/{}", trade.id), job.vendor_id)).await;
    assert!(body["data"]["vendor_job"]["verification_code"].is_null());

    let (status, _) = send(&app, get(&format!("/api/v1/vendor-jobs/{}", job.id), 4242)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_bad_path_id_rejected() {
    let h = Harness::new();
    let app = router(&h);
    let (status, body) = send(&app, get("/api/v1/trades/not-a-ulid", BUYER)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], error_codes::INVALID_PARAMETER);
}
