//! Release Engine
//!
//! Moves escrowed crypto to the buyer once the fiat leg is confirmed, and
//! handles pre-funding cancellation.
//!
//! # Release Gate
//!
//! ```text
//! status == PAYMENT_CONFIRMED
//!   && escrow == FUNDED
//!   && (no cash handoff || vendor job COMPLETED)
//! ```
//!
//! The transfer runs outside the trade lock with the trade id as idempotency
//! key. The release claim on [`TradeContext`] is taken under the lock before
//! the transfer and held until the outcome is recorded. Other writers refuse
//! a claimed trade.

use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::error::TradeError;
use super::state::{EscrowStatus, TradeStatus};
use super::types::{Trade, TradeIssue, TradePatch};
use super::{TradeContext, blocked};
use crate::core_types::{TradeId, UserId};
use crate::notify::{Notification, NotificationKind};
use crate::vendor::{JobStatus, VendorJobDispatcher};

pub struct ReleaseEngine {
    ctx: TradeContext,
    vendors: Arc<VendorJobDispatcher>,
}

impl ReleaseEngine {
    pub fn new(ctx: TradeContext, vendors: Arc<VendorJobDispatcher>) -> Self {
        Self { ctx, vendors }
    }

    /// Whether the release gate currently holds, without side effects
    pub async fn is_releasable(&self, trade: &Trade) -> Result<bool, TradeError> {
        Ok(self.check_gate(trade).await.is_ok())
    }

    /// Transfer escrowed funds to the buyer
    ///
    /// Provider failure leaves the trade at `payment_confirmed` with a
    /// `ReleaseFailure` fact so the worker can retry. Every failure after the
    /// gate passed reaches the operator.
    pub async fn release(&self, trade_id: TradeId) -> Result<Trade, TradeError> {
        let (trade, source, _claim) = {
            let _guard = self.ctx.trade_locks.lock(&trade_id).await;
            let trade = self.ctx.load_trade(trade_id).await?;
            let source = self.check_gate(&trade).await?;
            let Some(claim) = self.ctx.begin_release(trade_id) else {
                return Err(TradeError::InvalidStateTransition(format!(
                    "release already in progress for trade {}",
                    trade_id
                )));
            };
            (trade, source, claim)
        };

        info!(
            trade_id = %trade.id,
            asset = %trade.asset_type,
            amount = %trade.asset_amount,
            destination = %trade.receiving_address,
            "Releasing escrow"
        );

        let result = self
            .ctx
            .custodian
            .transfer(
                trade.asset_type,
                &source,
                &trade.receiving_address,
                trade.asset_amount,
                &trade.id.to_string(),
            )
            .await;

        match result {
            Ok(tx_id) => self.settle(trade_id, tx_id).await,
            Err(e) => {
                let reason = e.to_string();
                error!(trade_id = %trade_id, error = %reason, "Release transfer failed");
                self.record_failure(trade_id, &reason).await;
                self.ctx.notifier.emit(Notification::operator(
                    NotificationKind::ReleaseFailed,
                    json!({ "trade_id": trade_id, "reason": reason }),
                ));
                Err(TradeError::ReleaseFailure(reason))
            }
        }
    }

    /// Record a sent transfer. Caller still holds the release claim.
    async fn settle(&self, trade_id: TradeId, tx_id: String) -> Result<Trade, TradeError> {
        let (completed, stray_status) = {
            let _guard = self.ctx.trade_locks.lock(&trade_id).await;
            let now = self.ctx.clock.now();
            let patch = TradePatch {
                release_tx_id: Some(tx_id.clone()),
                completed_at: Some(now),
                ..TradePatch::none()
            }
            .clear_issue();
            let moved = self
                .ctx
                .store
                .transition_trade(
                    trade_id,
                    TradeStatus::PaymentConfirmed,
                    TradeStatus::Completed,
                    &patch,
                    now,
                )
                .await
                .inspect_err(|e| {
                    error!(trade_id = %trade_id, tx_id = %tx_id, error = %e, "Release sent but not recorded")
                })?;
            if moved {
                (Some(self.ctx.load_trade(trade_id).await?), None)
            } else {
                (None, self.keep_tx_id(trade_id, &tx_id).await)
            }
        };

        let Some(completed) = completed else {
            error!(
                trade_id = %trade_id,
                tx_id = %tx_id,
                current = ?stray_status,
                "Release sent but trade changed underneath"
            );
            self.ctx.notifier.emit(Notification::operator(
                NotificationKind::ReleaseFailed,
                json!({
                    "trade_id": trade_id,
                    "tx_id": tx_id,
                    "reason": "trade left payment_confirmed while the transfer was out",
                }),
            ));
            return Err(TradeError::InvalidStateTransition(format!(
                "trade {} changed during release (tx {})",
                trade_id, tx_id
            )));
        };

        info!(
            trade_id = %trade_id,
            tx_id = %tx_id,
            old_state = %TradeStatus::PaymentConfirmed,
            new_state = %completed.status,
            "Escrow released"
        );
        let payload = json!({ "trade_id": trade_id, "tx_id": tx_id });
        self.ctx.notifier.emit_all(vec![
            Notification::user(completed.seller_id, NotificationKind::TradeCompleted, payload.clone()),
            Notification::user(completed.buyer_id, NotificationKind::TradeCompleted, payload),
        ]);
        Ok(completed)
    }

    /// Attach `tx_id` to a trade that is no longer `payment_confirmed`,
    /// keeping its status. Returns the status it was found in.
    ///
    /// Caller holds the trade lock.
    async fn keep_tx_id(&self, trade_id: TradeId, tx_id: &str) -> Option<TradeStatus> {
        let current = match self.ctx.load_trade(trade_id).await {
            Ok(trade) => trade.status,
            Err(e) => {
                error!(trade_id = %trade_id, tx_id = %tx_id, error = %e, "Cannot reload trade to keep release tx");
                return None;
            }
        };
        let patch = TradePatch {
            release_tx_id: Some(tx_id.to_string()),
            ..TradePatch::none()
        };
        match self
            .ctx
            .store
            .transition_trade(trade_id, current, current, &patch, self.ctx.clock.now())
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(trade_id = %trade_id, tx_id = %tx_id, "Trade moved again; release tx not kept"),
            Err(e) => error!(trade_id = %trade_id, tx_id = %tx_id, error = %e, "Release tx not kept"),
        }
        Some(current)
    }

    /// Store the `ReleaseFailure` fact. A failed write is logged; the caller
    /// still reports the failure.
    async fn record_failure(&self, trade_id: TradeId, reason: &str) {
        let _guard = self.ctx.trade_locks.lock(&trade_id).await;
        let recorded = self
            .ctx
            .store
            .transition_trade(
                trade_id,
                TradeStatus::PaymentConfirmed,
                TradeStatus::PaymentConfirmed,
                &TradePatch::issue(TradeIssue::ReleaseFailure {
                    reason: reason.to_string(),
                }),
                self.ctx.clock.now(),
            )
            .await;
        match recorded {
            Ok(true) => {}
            Ok(false) => warn!(trade_id = %trade_id, "Release failure not recorded: trade left payment_confirmed"),
            Err(e) => error!(trade_id = %trade_id, error = %e, "Release failure not recorded"),
        }
    }

    /// Cancel before any funds are escrowed
    ///
    /// Funded trades leave through dispute, never here. A cash trade whose
    /// vendor already confirmed the buyer's transfer cannot be cancelled.
    pub async fn cancel(&self, trade_id: TradeId, party_id: UserId) -> Result<Trade, TradeError> {
        let (trade, cancelled_job) = {
            let _guard = self.ctx.trade_locks.lock(&trade_id).await;
            let trade = self.ctx.load_trade(trade_id).await?;
            if !trade.is_party(party_id) {
                return Err(TradeError::Forbidden);
            }
            if trade.status == TradeStatus::Disputed {
                return Err(blocked(&trade, "cancel"));
            }
            if trade.status != TradeStatus::PendingEscrow {
                return Err(TradeError::InvalidState {
                    current: trade.status,
                    action: "cancel",
                });
            }

            // Lock order: trade, then job. The job goes first so an advanced
            // handoff leaves the trade untouched.
            let job = self.vendors.cancel_for_trade(trade_id, party_id).await?;
            let moved = self
                .ctx
                .store
                .transition_trade(
                    trade_id,
                    TradeStatus::PendingEscrow,
                    TradeStatus::Cancelled,
                    &TradePatch::none(),
                    self.ctx.clock.now(),
                )
                .await?;
            if !moved {
                return Err(TradeError::InvalidStateTransition(format!(
                    "trade {} is no longer pending escrow",
                    trade_id
                )));
            }
            (self.ctx.load_trade(trade_id).await?, job)
        };

        info!(
            trade_id = %trade_id,
            cancelled_by = party_id,
            job_cancelled = cancelled_job.is_some(),
            new_state = %trade.status,
            "Trade cancelled"
        );
        let counterparty = if party_id == trade.seller_id {
            trade.buyer_id
        } else {
            trade.seller_id
        };
        self.ctx.notifier.emit(Notification::user(
            counterparty,
            NotificationKind::TradeCancelled,
            json!({ "trade_id": trade_id, "cancelled_by": party_id }),
        ));
        Ok(trade)
    }

    /// Release gate; returns the escrow source address
    async fn check_gate(&self, trade: &Trade) -> Result<String, TradeError> {
        if trade.status != TradeStatus::PaymentConfirmed {
            return Err(blocked(trade, "release"));
        }
        if trade.escrow_status != EscrowStatus::Funded {
            return Err(TradeError::InvalidStateTransition(format!(
                "escrow for trade {} is not funded",
                trade.id
            )));
        }
        let Some(source) = trade.escrow_address.clone() else {
            return Err(TradeError::InvalidStateTransition(format!(
                "trade {} has no escrow address",
                trade.id
            )));
        };
        if trade.requires_handoff()
            && self.vendors.status_for_trade(trade.id).await? != Some(JobStatus::Completed)
        {
            return Err(TradeError::HandoffIncomplete);
        }
        Ok(source)
    }
}
