//! Trade Lifecycle FSM
//!
//! Offer → match → escrow → payment → release, one component per stage.
//!
//! # State Machine
//!
//! ```text
//! PENDING_ESCROW → CRYPTO_DEPOSITED → CRYPTO_RECEIVED → PAYMENT_SUBMITTED
//!       ↓                                                     ↓
//!   CANCELLED                               PAYMENT_CONFIRMED → COMPLETED
//!
//! funded, non-terminal ──→ DISPUTED
//! ```
//!
//! # Safety Invariants
//!
//! 1. **CAS Every Transition**: status changes are conditional store updates;
//!    a lost CAS is reported, never retried blindly
//! 2. **No External Call Under Lock**: custodian and notification calls run
//!    after the per-trade lock is released
//! 3. **Idempotent Custody**: vault creation and release transfers use the
//!    trade id as idempotency key
//! 4. **Funds Never Auto-Refund**: once funded, the only exits are release
//!    and dispute
//! 5. **Release Owns The Trade**: while a release transfer is outstanding no
//!    other writer may move the trade

pub mod error;
pub mod escrow;
pub mod matching;
pub mod payment;
pub mod registry;
pub mod release;
pub mod state;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::TradeError;
pub use escrow::EscrowVaultManager;
pub use matching::{AcceptOutcome, MatchingCoordinator};
pub use payment::PaymentConfirmationTracker;
pub use registry::TradeRequestRegistry;
pub use release::ReleaseEngine;
pub use state::{EscrowStatus, RequestStatus, TradeStatus};
pub use types::{
    HandoffDetails, NewTradeRequest, RequestFilter, Trade, TradeIssue, TradePatch, TradeRequest,
};
pub use worker::{SweepReport, TradeWorker, WorkerConfig};

use dashmap::DashSet;
use std::sync::Arc;

use crate::clock::Clock;
use crate::core_types::TradeId;
use crate::custodian::Custodian;
use crate::locks::KeyedLocks;
use crate::notify::NotificationEmitter;
use crate::store::TradeStore;

/// Collaborators shared by every lifecycle component
#[derive(Clone)]
pub struct TradeContext {
    pub store: Arc<dyn TradeStore>,
    pub custodian: Arc<dyn Custodian>,
    pub notifier: Arc<dyn NotificationEmitter>,
    pub clock: Arc<dyn Clock>,
    /// One writer per trade across all components
    pub trade_locks: Arc<KeyedLocks<TradeId>>,
    /// Trades with a release transfer outstanding; set and checked under the trade lock
    releasing: Arc<DashSet<TradeId>>,
}

impl TradeContext {
    pub fn new(
        store: Arc<dyn TradeStore>,
        custodian: Arc<dyn Custodian>,
        notifier: Arc<dyn NotificationEmitter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            custodian,
            notifier,
            clock,
            trade_locks: Arc::new(KeyedLocks::new()),
            releasing: Arc::new(DashSet::new()),
        }
    }

    /// Whether a release transfer for `id` is outstanding
    pub fn is_releasing(&self, id: TradeId) -> bool {
        self.releasing.contains(&id)
    }

    /// Claim the release slot for `id`; `None` if another release holds it.
    /// Caller holds the trade lock.
    pub(crate) fn begin_release(&self, id: TradeId) -> Option<ReleaseClaim> {
        self.releasing.insert(id).then(|| ReleaseClaim {
            set: self.releasing.clone(),
            trade_id: id,
        })
    }

    pub(crate) async fn load_trade(&self, id: TradeId) -> Result<Trade, TradeError> {
        self.store
            .get_trade(id)
            .await?
            .ok_or_else(|| TradeError::NotFound("Trade", id.to_string()))
    }
}

/// Release slot for one trade, freed on drop
pub(crate) struct ReleaseClaim {
    set: Arc<DashSet<TradeId>>,
    trade_id: TradeId,
}

impl Drop for ReleaseClaim {
    fn drop(&mut self) {
        self.set.remove(&self.trade_id);
    }
}

/// The error a caller gets when `trade` cannot take `action` in its current state.
///
/// Recorded facts win over the generic state error so the caller learns why
/// the trade is stuck.
pub(crate) fn blocked(trade: &Trade, action: &'static str) -> TradeError {
    if trade.status == TradeStatus::Disputed {
        let reason = match &trade.issue {
            Some(TradeIssue::DisputeRaised { reason, .. }) => reason.clone(),
            Some(other) => other.to_string(),
            None => "awaiting operator review".to_string(),
        };
        return TradeError::DisputeRaised(reason);
    }

    if trade.status.is_awaiting_funding() {
        match &trade.issue {
            Some(TradeIssue::UnderfundedDeposit { received }) => {
                return TradeError::UnderfundedDeposit {
                    received: received.to_string(),
                    expected: trade.asset_amount.to_string(),
                };
            }
            Some(TradeIssue::OverfundedDeposit { received }) => {
                return TradeError::OverfundedDeposit {
                    received: received.to_string(),
                    expected: trade.asset_amount.to_string(),
                };
            }
            Some(TradeIssue::EscrowFundingTimeout) => return TradeError::EscrowFundingTimeout,
            _ => {}
        }
    }

    TradeError::InvalidState {
        current: trade.status,
        action,
    }
}
