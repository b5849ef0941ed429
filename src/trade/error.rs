//! Trade Error Types
//!
//! Every failure maps to a stable code the caller can branch on. Nothing
//! here is ever folded into a success response.

use thiserror::Error;

use super::state::TradeStatus;
use crate::custodian::CustodianError;
use crate::store::StoreError;
use crate::vendor::state::JobStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeError {
    // === Caller Errors (synchronous, never retried) ===
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Offer no longer available")]
    RaceLost,

    #[error("Trade request has expired")]
    Expired,

    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    #[error("Caller is not allowed to perform this action")]
    Forbidden,

    #[error("Cannot {action} while trade is {current}")]
    InvalidState {
        current: TradeStatus,
        action: &'static str,
    },

    #[error("Cannot {action} while vendor job is {current}")]
    InvalidJobState {
        current: JobStatus,
        action: &'static str,
    },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // === Escrow / Payment Facts ===
    #[error("No qualifying deposit inside the funding window")]
    EscrowFundingTimeout,

    #[error("Deposit below trade amount (received {received}, expected {expected})")]
    UnderfundedDeposit { received: String, expected: String },

    #[error("Deposit above trade amount (received {received}, expected {expected})")]
    OverfundedDeposit { received: String, expected: String },

    #[error("Payment proof already submitted")]
    DuplicateProofSubmission,

    #[error("Trade is under dispute: {0}")]
    DisputeRaised(String),

    // === Release ===
    #[error("Release transfer failed: {0}")]
    ReleaseFailure(String),

    #[error("Cash handoff not completed")]
    HandoffIncomplete,

    // === Vendor Handoff ===
    #[error("Invalid verification code")]
    InvalidVerificationCode,

    #[error("Verification locked after too many attempts")]
    VerificationLocked,

    // === System Errors ===
    #[error("Escrow address already bound to another trade: {0}")]
    EscrowAddressConflict(String),

    #[error("Custodian error: {0}")]
    Custodian(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TradeError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TradeError::Validation(_) => "VALIDATION_ERROR",
            TradeError::RaceLost => "RACE_LOST",
            TradeError::Expired => "EXPIRED",
            TradeError::NotFound(..) => "NOT_FOUND",
            TradeError::Forbidden => "FORBIDDEN",
            TradeError::InvalidState { .. } => "INVALID_STATE",
            TradeError::InvalidJobState { .. } => "INVALID_JOB_STATE",
            TradeError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            TradeError::EscrowFundingTimeout => "ESCROW_FUNDING_TIMEOUT",
            TradeError::UnderfundedDeposit { .. } => "UNDERFUNDED_DEPOSIT",
            TradeError::OverfundedDeposit { .. } => "OVERFUNDED_DEPOSIT",
            TradeError::DuplicateProofSubmission => "DUPLICATE_PROOF_SUBMISSION",
            TradeError::DisputeRaised(_) => "DISPUTE_RAISED",
            TradeError::ReleaseFailure(_) => "RELEASE_FAILURE",
            TradeError::HandoffIncomplete => "HANDOFF_INCOMPLETE",
            TradeError::InvalidVerificationCode => "INVALID_VERIFICATION_CODE",
            TradeError::VerificationLocked => "VERIFICATION_LOCKED",
            TradeError::EscrowAddressConflict(_) => "ESCROW_ADDRESS_CONFLICT",
            TradeError::Custodian(_) => "CUSTODIAN_ERROR",
            TradeError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TradeError::Validation(_) | TradeError::InvalidVerificationCode => 400,
            TradeError::Forbidden => 403,
            TradeError::NotFound(..) => 404,
            TradeError::RaceLost
            | TradeError::InvalidState { .. }
            | TradeError::InvalidJobState { .. }
            | TradeError::DuplicateProofSubmission
            | TradeError::DisputeRaised(_)
            | TradeError::HandoffIncomplete
            | TradeError::InvalidStateTransition(_) => 409,
            TradeError::Expired => 410,
            TradeError::EscrowFundingTimeout
            | TradeError::UnderfundedDeposit { .. }
            | TradeError::OverfundedDeposit { .. }
            | TradeError::VerificationLocked => 422,
            TradeError::EscrowAddressConflict(_) | TradeError::Storage(_) => 500,
            TradeError::ReleaseFailure(_) | TradeError::Custodian(_) => 502,
        }
    }

    /// Worth retrying the same call later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TradeError::ReleaseFailure(_) | TradeError::Custodian(_) | TradeError::Storage(_)
        )
    }
}

impl From<StoreError> for TradeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AddressInUse(addr) => TradeError::EscrowAddressConflict(addr),
            StoreError::DuplicateTrade(req_id) => TradeError::InvalidStateTransition(format!(
                "trade already exists for request {}",
                req_id
            )),
            other => TradeError::Storage(other.to_string()),
        }
    }
}

impl From<CustodianError> for TradeError {
    fn from(e: CustodianError) -> Self {
        TradeError::Custodian(e.to_string())
    }
}
