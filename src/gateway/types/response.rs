//! API Response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `ApiError`: Error half of every handler result
//! - `error_codes`: Standard error code constants

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::trade::TradeError;

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// All API responses follow this structure:
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or null (error)
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    /// Response data (only present when code == 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create success response
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    /// Create error response
    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Handler error: HTTP status plus the numeric API code
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Wrap `data` in a success envelope
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error_codes::AUTH_FAILED, msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::SERVICE_UNAVAILABLE,
            msg,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.code, self.msg))).into_response()
    }
}

impl From<TradeError> for ApiError {
    fn from(e: TradeError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = match &e {
            TradeError::Validation(_) => error_codes::INVALID_PARAMETER,
            TradeError::InvalidVerificationCode => error_codes::INVALID_VERIFICATION_CODE,
            TradeError::Forbidden => error_codes::FORBIDDEN,
            TradeError::RaceLost => error_codes::RACE_LOST,
            TradeError::Expired => error_codes::EXPIRED,
            TradeError::InvalidState { .. }
            | TradeError::InvalidJobState { .. }
            | TradeError::InvalidStateTransition(_) => error_codes::INVALID_STATE,
            TradeError::DuplicateProofSubmission => error_codes::DUPLICATE_PROOF,
            TradeError::DisputeRaised(_) => error_codes::DISPUTE_RAISED,
            TradeError::HandoffIncomplete => error_codes::HANDOFF_INCOMPLETE,
            TradeError::EscrowFundingTimeout => error_codes::ESCROW_FUNDING_TIMEOUT,
            TradeError::UnderfundedDeposit { .. } => error_codes::UNDERFUNDED_DEPOSIT,
            TradeError::OverfundedDeposit { .. } => error_codes::OVERFUNDED_DEPOSIT,
            TradeError::VerificationLocked => error_codes::VERIFICATION_LOCKED,
            TradeError::NotFound(..) => error_codes::NOT_FOUND,
            TradeError::ReleaseFailure(_) | TradeError::Custodian(_) => {
                error_codes::CUSTODIAN_ERROR
            }
            TradeError::EscrowAddressConflict(_) | TradeError::Storage(_) => {
                error_codes::INTERNAL_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %e, code = e.code(), "Request failed");
        }
        // Storage details stay in the log
        let msg = match e {
            TradeError::Storage(_) => "internal error".to_string(),
            other => format!("{}: {}", other.code(), other),
        };
        Self::new(status, code, msg)
    }
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INVALID_VERIFICATION_CODE: i32 = 1002;

    // Auth errors (2xxx)
    pub const MISSING_AUTH: i32 = 2001;
    pub const AUTH_FAILED: i32 = 2002;
    pub const FORBIDDEN: i32 = 2003;

    // Lifecycle errors (3xxx)
    pub const RACE_LOST: i32 = 3001;
    pub const EXPIRED: i32 = 3002;
    pub const INVALID_STATE: i32 = 3003;
    pub const DUPLICATE_PROOF: i32 = 3004;
    pub const DISPUTE_RAISED: i32 = 3005;
    pub const HANDOFF_INCOMPLETE: i32 = 3006;
    pub const ESCROW_FUNDING_TIMEOUT: i32 = 3007;
    pub const UNDERFUNDED_DEPOSIT: i32 = 3008;
    pub const OVERFUNDED_DEPOSIT: i32 = 3009;
    pub const VERIFICATION_LOCKED: i32 = 3010;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4001;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
    pub const CUSTODIAN_ERROR: i32 = 5002;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::TradeStatus;

    #[test]
    fn test_trade_error_mapping() {
        let err = ApiError::from(TradeError::RaceLost);
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, error_codes::RACE_LOST);
        assert!(err.msg.starts_with("RACE_LOST"));

        let err = ApiError::from(TradeError::InvalidState {
            current: TradeStatus::Completed,
            action: "release",
        });
        assert_eq!(err.code, error_codes::INVALID_STATE);

        let err = ApiError::from(TradeError::NotFound("Trade", "x".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_storage_detail_hidden() {
        let err = ApiError::from(TradeError::Storage("password=hunter2".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.msg, "internal error");
    }

    #[test]
    fn test_success_envelope() {
        let json = serde_json::to_value(ApiResponse::success(7)).unwrap();
        assert_eq!(json["code"], 0);
        assert_eq!(json["msg"], "ok");
        assert_eq!(json["data"], 7);

        let json = serde_json::to_value(ApiResponse::<()>::error(3001, "lost")).unwrap();
        assert!(json.get("data").is_none());
    }
}
