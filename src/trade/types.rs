//! Trade Core Types
//!
//! Records owned by the trade FSM: the offer ([`TradeRequest`]), the matched
//! [`Trade`], and the state facts ([`TradeIssue`]) attached to a trade when an
//! external signal is late or inconsistent.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::state::{EscrowStatus, RequestStatus, TradeStatus};
use crate::core_types::{AssetType, Direction, PaymentMethod, TradeId, TradeRequestId, UserId};

/// Cash handoff details carried by requests that move fiat in person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffDetails {
    /// Cash amount handed over (USD)
    pub amount_usd: Decimal,
    /// Delivery address / pickup instructions, opaque to the core
    #[serde(default)]
    pub address_payload: Option<serde_json::Value>,
}

/// Requester input for a new offer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTradeRequest {
    pub direction: Direction,
    pub asset_type: AssetType,
    pub asset_amount: Decimal,
    pub fiat_amount: Decimal,
    pub rate: Decimal,
    pub payment_method: PaymentMethod,
    /// Buy requests: where released crypto goes
    #[serde(default)]
    pub receiving_address: Option<String>,
    /// Required for cash pickup / delivery
    #[serde(default)]
    pub handoff: Option<HandoffDetails>,
    /// Targeted offer: counterparties told directly when the offer is gone
    #[serde(default)]
    pub candidate_ids: Vec<UserId>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Open, time-boxed offer. Never deleted; retained as the audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub id: TradeRequestId,
    pub requester_id: UserId,
    pub direction: Direction,
    pub asset_type: AssetType,
    pub asset_amount: Decimal,
    pub fiat_amount: Decimal,
    pub rate: Decimal,
    pub payment_method: PaymentMethod,
    pub status: RequestStatus,
    pub receiving_address: Option<String>,
    pub handoff: Option<HandoffDetails>,
    pub candidate_ids: Vec<UserId>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TradeRequest {
    pub fn new(
        requester_id: UserId,
        spec: NewTradeRequest,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TradeRequestId::new(),
            requester_id,
            direction: spec.direction,
            asset_type: spec.asset_type,
            asset_amount: spec.asset_amount,
            fiat_amount: spec.fiat_amount,
            rate: spec.rate,
            payment_method: spec.payment_method,
            status: RequestStatus::Open,
            receiving_address: spec.receiving_address,
            handoff: spec.handoff,
            candidate_ids: spec.candidate_ids,
            notes: spec.notes,
            created_at,
            expires_at,
        }
    }

    /// Open and not past its deadline at `now`
    #[inline]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == RequestStatus::Open && now < self.expires_at
    }
}

/// Listing filter for open offers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestFilter {
    pub direction: Option<Direction>,
    pub asset_type: Option<AssetType>,
    pub payment_method: Option<PaymentMethod>,
}

impl RequestFilter {
    pub fn matches(&self, req: &TradeRequest) -> bool {
        self.direction.is_none_or(|d| d == req.direction)
            && self.asset_type.is_none_or(|a| a == req.asset_type)
            && self.payment_method.is_none_or(|m| m == req.payment_method)
    }
}

/// State fact recorded on a trade
///
/// Timeouts and funding mismatches are not thrown at callers; they are
/// attached to the trade and surfaced through `trade_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TradeIssue {
    /// Confirmed balance below the trade amount
    UnderfundedDeposit { received: Decimal },
    /// Confirmed balance above the trade amount - manual reconciliation
    OverfundedDeposit { received: Decimal },
    /// No qualifying deposit inside the funding window
    EscrowFundingTimeout,
    /// Post-funding stall or party complaint
    DisputeRaised {
        reason: String,
        raised_by: Option<UserId>,
    },
    /// Last release transfer attempt failed
    ReleaseFailure { reason: String },
}

impl TradeIssue {
    /// Shares codes with [`super::error::TradeError::code`]
    pub fn code(&self) -> &'static str {
        match self {
            TradeIssue::UnderfundedDeposit { .. } => "UNDERFUNDED_DEPOSIT",
            TradeIssue::OverfundedDeposit { .. } => "OVERFUNDED_DEPOSIT",
            TradeIssue::EscrowFundingTimeout => "ESCROW_FUNDING_TIMEOUT",
            TradeIssue::DisputeRaised { .. } => "DISPUTE_RAISED",
            TradeIssue::ReleaseFailure { .. } => "RELEASE_FAILURE",
        }
    }

    /// Needs an operator before the trade can move again
    pub fn needs_operator(&self) -> bool {
        matches!(
            self,
            TradeIssue::OverfundedDeposit { .. }
                | TradeIssue::DisputeRaised { .. }
                | TradeIssue::ReleaseFailure { .. }
        )
    }
}

impl fmt::Display for TradeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeIssue::UnderfundedDeposit { received } => {
                write!(f, "awaiting full deposit (received {})", received)
            }
            TradeIssue::OverfundedDeposit { received } => {
                write!(f, "overfunded deposit of {} held for reconciliation", received)
            }
            TradeIssue::EscrowFundingTimeout => write!(f, "no deposit inside funding window"),
            TradeIssue::DisputeRaised { reason, .. } => write!(f, "dispute: {}", reason),
            TradeIssue::ReleaseFailure { reason } => write!(f, "release failed: {}", reason),
        }
    }
}

/// Matched trade, the live entity once an offer is accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub trade_request_id: TradeRequestId,
    pub seller_id: UserId,
    pub buyer_id: UserId,
    pub asset_type: AssetType,
    pub asset_amount: Decimal,
    pub fiat_amount: Decimal,
    pub rate: Decimal,
    pub payment_method: PaymentMethod,
    pub status: TradeStatus,
    pub escrow_address: Option<String>,
    pub escrow_status: EscrowStatus,
    /// Buyer's declared address for the release transfer
    pub receiving_address: String,
    pub payment_proof_ref: Option<String>,
    pub issue: Option<TradeIssue>,
    pub release_tx_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub funded_at: Option<DateTime<Utc>>,
    pub payment_submitted_at: Option<DateTime<Utc>>,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    /// Build the trade for an accepted request
    ///
    /// A sell request puts the requester on the crypto side; a buy request
    /// makes the accepting counterparty the seller.
    pub fn from_request(
        req: &TradeRequest,
        counterparty_id: UserId,
        receiving_address: String,
        now: DateTime<Utc>,
    ) -> Self {
        let (seller_id, buyer_id) = match req.direction {
            Direction::Sell => (req.requester_id, counterparty_id),
            Direction::Buy => (counterparty_id, req.requester_id),
        };

        Self {
            id: TradeId::new(),
            trade_request_id: req.id,
            seller_id,
            buyer_id,
            asset_type: req.asset_type,
            asset_amount: req.asset_amount,
            fiat_amount: req.fiat_amount,
            rate: req.rate,
            payment_method: req.payment_method,
            status: TradeStatus::PendingEscrow,
            escrow_address: None,
            escrow_status: EscrowStatus::Pending,
            receiving_address,
            payment_proof_ref: None,
            issue: None,
            release_tx_id: None,
            created_at: now,
            funded_at: None,
            payment_submitted_at: None,
            payment_confirmed_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    #[inline]
    pub fn requires_handoff(&self) -> bool {
        self.payment_method.requires_handoff()
    }

    #[inline]
    pub fn is_party(&self, user_id: UserId) -> bool {
        user_id == self.seller_id || user_id == self.buyer_id
    }

    /// Apply a patch in place; the caller has already checked the status CAS
    pub fn apply(&mut self, status: TradeStatus, patch: &TradePatch, now: DateTime<Utc>) {
        self.status = status;
        if let Some(escrow_status) = patch.escrow_status {
            self.escrow_status = escrow_status;
        }
        if let Some(ref proof) = patch.payment_proof_ref {
            self.payment_proof_ref = Some(proof.clone());
        }
        if let Some(ref issue) = patch.issue {
            self.issue = issue.clone();
        }
        if let Some(ref tx_id) = patch.release_tx_id {
            self.release_tx_id = Some(tx_id.clone());
        }
        if patch.funded_at.is_some() {
            self.funded_at = patch.funded_at;
        }
        if patch.payment_submitted_at.is_some() {
            self.payment_submitted_at = patch.payment_submitted_at;
        }
        if patch.payment_confirmed_at.is_some() {
            self.payment_confirmed_at = patch.payment_confirmed_at;
        }
        if patch.completed_at.is_some() {
            self.completed_at = patch.completed_at;
        }
        self.updated_at = now;
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trade[{}] {} {} seller={} buyer={} state={} escrow={}",
            self.id,
            self.asset_amount,
            self.asset_type,
            self.seller_id,
            self.buyer_id,
            self.status,
            self.escrow_status
        )
    }
}

/// Field changes applied together with a trade status CAS
///
/// `None` leaves a field untouched. `issue: Some(None)` clears the issue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradePatch {
    pub escrow_status: Option<EscrowStatus>,
    pub payment_proof_ref: Option<String>,
    pub issue: Option<Option<TradeIssue>>,
    pub release_tx_id: Option<String>,
    pub funded_at: Option<DateTime<Utc>>,
    pub payment_submitted_at: Option<DateTime<Utc>>,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TradePatch {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn issue(issue: TradeIssue) -> Self {
        Self {
            issue: Some(Some(issue)),
            ..Self::default()
        }
    }

    pub fn clear_issue(mut self) -> Self {
        self.issue = Some(None);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn sample_request(direction: Direction) -> TradeRequest {
        let now = Utc::now();
        TradeRequest::new(
            100,
            NewTradeRequest {
                direction,
                asset_type: AssetType::Btc,
                asset_amount: d("0.01"),
                fiat_amount: d("1500000"),
                rate: d("150000000"),
                payment_method: PaymentMethod::BankTransfer,
                receiving_address: None,
                handoff: None,
                candidate_ids: vec![],
                notes: None,
            },
            now,
            now + chrono::Duration::minutes(10),
        )
    }

    #[test]
    fn test_trade_sides_follow_direction() {
        let now = Utc::now();

        let sell = sample_request(Direction::Sell);
        let trade = Trade::from_request(&sell, 200, "bc1qbuyer".into(), now);
        assert_eq!(trade.seller_id, 100);
        assert_eq!(trade.buyer_id, 200);

        let buy = sample_request(Direction::Buy);
        let trade = Trade::from_request(&buy, 200, "bc1qbuyer".into(), now);
        assert_eq!(trade.seller_id, 200);
        assert_eq!(trade.buyer_id, 100);
        assert_eq!(trade.status, TradeStatus::PendingEscrow);
        assert_eq!(trade.escrow_status, EscrowStatus::Pending);
    }

    #[test]
    fn test_request_liveness() {
        let req = sample_request(Direction::Sell);
        assert!(req.is_live(req.created_at));
        assert!(!req.is_live(req.expires_at));
    }

    #[test]
    fn test_filter() {
        let req = sample_request(Direction::Sell);
        assert!(RequestFilter::default().matches(&req));

        let filter = RequestFilter {
            direction: Some(Direction::Buy),
            ..Default::default()
        };
        assert!(!filter.matches(&req));
    }

    #[test]
    fn test_patch_apply_keeps_untouched_fields() {
        let now = Utc::now();
        let req = sample_request(Direction::Sell);
        let mut trade = Trade::from_request(&req, 200, "bc1qbuyer".into(), now);
        trade.payment_proof_ref = Some("proof-1".into());

        trade.apply(
            TradeStatus::CryptoReceived,
            &TradePatch {
                escrow_status: Some(EscrowStatus::Funded),
                funded_at: Some(now),
                ..Default::default()
            },
            now,
        );

        assert_eq!(trade.status, TradeStatus::CryptoReceived);
        assert_eq!(trade.escrow_status, EscrowStatus::Funded);
        assert_eq!(trade.payment_proof_ref.as_deref(), Some("proof-1"));
    }

    #[test]
    fn test_patch_clear_issue() {
        let now = Utc::now();
        let req = sample_request(Direction::Sell);
        let mut trade = Trade::from_request(&req, 200, "bc1qbuyer".into(), now);

        trade.apply(
            TradeStatus::PendingEscrow,
            &TradePatch::issue(TradeIssue::EscrowFundingTimeout),
            now,
        );
        assert_eq!(trade.issue, Some(TradeIssue::EscrowFundingTimeout));

        trade.apply(TradeStatus::PendingEscrow, &TradePatch::none().clear_issue(), now);
        assert!(trade.issue.is_none());
    }

    #[test]
    fn test_issue_codes() {
        assert_eq!(TradeIssue::EscrowFundingTimeout.code(), "ESCROW_FUNDING_TIMEOUT");
        assert!(
            TradeIssue::OverfundedDeposit {
                received: Decimal::ONE
            }
            .needs_operator()
        );
        assert!(
            !TradeIssue::UnderfundedDeposit {
                received: Decimal::ONE
            }
            .needs_operator()
        );
    }
}
