//! Bearer JWT authentication
//!
//! Tokens are issued by the identity provider and signed with the shared
//! HS256 secret. `sub` carries the numeric user id.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::state::AppState;
use super::types::{ApiResponse, error_codes};
use crate::core_types::UserId;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // User ID
    pub exp: usize,  // Expiration time (as UTC timestamp)
    pub iat: usize,  // Issued at
}

/// Authenticated caller, inserted into request extensions by the middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

/// Sign a token for `user_id` valid for `ttl_secs`
pub fn issue_token(
    secret: &str,
    user_id: UserId,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + ttl_secs) as usize,
        iat: now as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify signature and expiry, returning the user id
pub fn verify_token(secret: &str, token: &str) -> Option<UserId> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .ok()?;
    data.claims.sub.parse::<UserId>().ok().filter(|id| *id != 0)
}

pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::error(
                error_codes::MISSING_AUTH,
                "Missing Authorization header",
            )),
        ))?;

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::error(
                error_codes::AUTH_FAILED,
                "Invalid token format",
            )),
        ));
    };

    match verify_token(&state.jwt_secret, token) {
        Some(user_id) => {
            request.extensions_mut().insert(AuthUser(user_id));
            Ok(next.run(request).await)
        }
        None => Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::error(
                error_codes::AUTH_FAILED,
                "Invalid or expired token",
            )),
        )),
    }
}
