//! Custodian boundary
//!
//! The custodial wallet provider is a black box reached through [`Custodian`].
//! Every call that moves or allocates funds carries an idempotency key (the
//! trade id) so a retried call never creates a second vault or transfer.

pub mod http;
#[cfg(any(test, feature = "mock-api"))]
pub mod mock;

pub use http::HttpCustodian;
#[cfg(any(test, feature = "mock-api"))]
pub use mock::MockCustodian;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::AssetType;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CustodianError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Custodian rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported asset: {0}")]
    UnsupportedAsset(AssetType),

    #[error("Malformed custodian response: {0}")]
    Decode(String),
}

/// Balance seen at an escrow address
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Deposits with enough confirmations to count as funded
    pub confirmed: Decimal,
    /// Deposits seen but not yet confirmed
    pub pending: Decimal,
}

#[async_trait]
pub trait Custodian: Send + Sync {
    /// Allocate a fresh deposit address. Same key, same address.
    async fn create_vault(
        &self,
        asset: AssetType,
        idempotency_key: &str,
    ) -> Result<String, CustodianError>;

    async fn get_balance(&self, asset: AssetType, address: &str) -> Result<Balance, CustodianError>;

    /// Move funds out of a vault. Same key, same transfer; returns the tx id.
    async fn transfer(
        &self,
        asset: AssetType,
        source: &str,
        destination: &str,
        amount: Decimal,
        idempotency_key: &str,
    ) -> Result<String, CustodianError>;

    async fn validate_address(&self, asset: AssetType, address: &str)
    -> Result<bool, CustodianError>;
}
