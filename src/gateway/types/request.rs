//! Request bodies for the trade endpoints
//!
//! Decimal amounts travel as strings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::TradeId;

#[derive(Debug, Default, Deserialize)]
pub struct AcceptBody {
    /// Accepting buyer's address; required on sell offers
    #[serde(default)]
    pub receiving_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProofBody {
    pub proof_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct DisputeBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitJobPaymentBody {
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmJobPaymentBody {
    pub amount_received: Decimal,
    #[serde(default)]
    pub bank_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteJobBody {
    pub code: String,
}

/// Custodian deposit notification
#[derive(Debug, Deserialize)]
pub struct DepositCallbackBody {
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct DepositAck {
    pub trade_id: TradeId,
    pub status: String,
}
