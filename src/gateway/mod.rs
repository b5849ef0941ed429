//! HTTP gateway
//!
//! `/api/v1/*` requires a bearer JWT. `/internal/custodian/*` is for the
//! custodian's callbacks and checks a shared token instead.

pub mod auth;
pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use state::AppState;

/// Assemble the full router
pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route(
            "/trade-requests",
            post(handlers::create_trade_request).get(handlers::list_trade_requests),
        )
        .route("/trade-requests/mine", get(handlers::my_trade_requests))
        .route(
            "/trade-requests/{id}/accept",
            post(handlers::accept_trade_request),
        )
        .route(
            "/trade-requests/{id}/decline",
            post(handlers::decline_trade_request),
        )
        .route(
            "/trade-requests/{id}/cancel",
            post(handlers::cancel_trade_request),
        )
        .route("/trades/{id}", get(handlers::get_trade))
        .route(
            "/trades/{id}/payment-proof",
            post(handlers::submit_payment_proof),
        )
        .route(
            "/trades/{id}/confirm-payment",
            post(handlers::confirm_payment),
        )
        .route("/trades/{id}/cancel", post(handlers::cancel_trade))
        .route("/trades/{id}/dispute", post(handlers::raise_dispute))
        .route("/vendor-jobs/{id}", get(handlers::get_vendor_job))
        .route(
            "/vendor-jobs/{id}/submit-payment",
            post(handlers::submit_job_payment),
        )
        .route(
            "/vendor-jobs/{id}/confirm-payment",
            post(handlers::confirm_job_payment),
        )
        .route("/vendor-jobs/{id}/start", post(handlers::start_vendor_job))
        .route(
            "/vendor-jobs/{id}/complete",
            post(handlers::complete_vendor_job),
        )
        .layer(from_fn_with_state(state.clone(), auth::jwt_auth_middleware));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/internal/custodian/deposit",
            post(handlers::deposit_callback),
        )
        .nest("/api/v1", api_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Bind and serve until the process exits
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    tracing::info!(%addr, "Gateway listening");
    tracing::info!("API docs: http://{}/docs", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
