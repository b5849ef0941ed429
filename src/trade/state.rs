//! Trade FSM State Definitions
//!
//! State IDs are stored as SMALLINT. Forward states are ordered by id so the
//! lifecycle is monotonic; absorbing states are negative.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade request (offer) status
///
/// ```text
/// OPEN → ACCEPTED
///   ↓ ↘
/// EXPIRED  CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum RequestStatus {
    Open = 0,
    Accepted = 10,
    Cancelled = -10,
    Expired = -20,
}

impl RequestStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Open)
    }

    #[inline]
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Open, RequestStatus::Accepted)
                | (RequestStatus::Open, RequestStatus::Cancelled)
                | (RequestStatus::Open, RequestStatus::Expired)
        )
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(RequestStatus::Open),
            10 => Some(RequestStatus::Accepted),
            -10 => Some(RequestStatus::Cancelled),
            -20 => Some(RequestStatus::Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade FSM States
///
/// ```text
/// PENDING_ESCROW → CRYPTO_DEPOSITED → CRYPTO_RECEIVED → PAYMENT_SUBMITTED
///       ↓    ↘__________________________↗                    ↓
///   CANCELLED                                        PAYMENT_CONFIRMED → COMPLETED
///
/// any funded, non-terminal state ──→ DISPUTED
/// ```
///
/// Terminal states: COMPLETED, DISPUTED, CANCELLED.
/// DISPUTED and CANCELLED close only by human resolution outside this FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum TradeStatus {
    /// Matched, waiting for the seller's deposit
    PendingEscrow = 0,

    /// Deposit seen at the escrow address but not yet confirmed
    CryptoDeposited = 10,

    /// Exact deposit confirmed - funds are COMMITTED and cannot be auto-refunded
    CryptoReceived = 20,

    /// Buyer submitted fiat payment proof
    PaymentSubmitted = 30,

    /// Seller confirmed fiat receipt - release is allowed
    PaymentConfirmed = 40,

    /// Terminal: escrow released to the buyer
    Completed = 50,

    /// Terminal: needs human resolution, funds stay in escrow
    Disputed = -10,

    /// Terminal: cancelled before any funds were escrowed
    Cancelled = -20,
}

impl TradeStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Completed | TradeStatus::Disputed | TradeStatus::Cancelled
        )
    }

    /// Escrow may hold (or be about to hold) funds: cancellation must go
    /// through the dispute path from here on
    #[inline]
    pub fn is_post_funding(&self) -> bool {
        matches!(
            self,
            TradeStatus::CryptoDeposited
                | TradeStatus::CryptoReceived
                | TradeStatus::PaymentSubmitted
                | TradeStatus::PaymentConfirmed
        )
    }

    /// Waiting on the escrow deposit
    #[inline]
    pub fn is_awaiting_funding(&self) -> bool {
        matches!(
            self,
            TradeStatus::PendingEscrow | TradeStatus::CryptoDeposited
        )
    }

    /// Transition table
    pub fn can_transition_to(&self, next: TradeStatus) -> bool {
        use TradeStatus::*;
        match (self, next) {
            (PendingEscrow, CryptoDeposited)
            | (PendingEscrow, CryptoReceived)
            | (PendingEscrow, Cancelled)
            | (CryptoDeposited, CryptoReceived)
            | (CryptoReceived, PaymentSubmitted)
            | (PaymentSubmitted, PaymentConfirmed)
            | (PaymentConfirmed, Completed) => true,
            (from, Disputed) => from.is_post_funding(),
            _ => false,
        }
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TradeStatus::PendingEscrow),
            10 => Some(TradeStatus::CryptoDeposited),
            20 => Some(TradeStatus::CryptoReceived),
            30 => Some(TradeStatus::PaymentSubmitted),
            40 => Some(TradeStatus::PaymentConfirmed),
            50 => Some(TradeStatus::Completed),
            -10 => Some(TradeStatus::Disputed),
            -20 => Some(TradeStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::PendingEscrow => "pending_escrow",
            TradeStatus::CryptoDeposited => "crypto_deposited",
            TradeStatus::CryptoReceived => "crypto_received",
            TradeStatus::PaymentSubmitted => "payment_submitted",
            TradeStatus::PaymentConfirmed => "payment_confirmed",
            TradeStatus::Completed => "completed",
            TradeStatus::Disputed => "disputed",
            TradeStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i16> for TradeStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TradeStatus::from_id(value).ok_or(())
    }
}

/// Escrow funding status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum EscrowStatus {
    Pending = 0,
    Funded = 1,
}

impl EscrowStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(EscrowStatus::Pending),
            1 => Some(EscrowStatus::Funded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Pending => "pending",
            EscrowStatus::Funded => "funded",
        }
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
