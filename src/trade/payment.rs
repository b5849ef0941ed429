//! Payment Confirmation Tracker
//!
//! Fiat leg of the trade. The buyer submits a proof reference, the seller
//! confirms receipt. Stalls on either side route to dispute, never to an
//! automatic cancel: the crypto is already in escrow.

use serde_json::json;
use tracing::{info, warn};

use super::error::TradeError;
use super::state::TradeStatus;
use super::types::{Trade, TradeIssue, TradePatch};
use super::{TradeContext, blocked};
use crate::config::TradeConfig;
use crate::core_types::{TradeId, UserId};
use crate::notify::{Notification, NotificationKind};

const MAX_PROOF_REF_LEN: usize = 512;
const MAX_REASON_LEN: usize = 1000;

pub struct PaymentConfirmationTracker {
    ctx: TradeContext,
    config: TradeConfig,
}

impl PaymentConfirmationTracker {
    pub fn new(ctx: TradeContext, config: TradeConfig) -> Self {
        Self { ctx, config }
    }

    /// Buyer reports the fiat payment
    ///
    /// The first proof reference is kept; later submissions are rejected.
    pub async fn submit_proof(
        &self,
        trade_id: TradeId,
        payer_id: UserId,
        proof_ref: String,
    ) -> Result<Trade, TradeError> {
        let proof_ref = proof_ref.trim().to_string();
        if proof_ref.is_empty() || proof_ref.len() > MAX_PROOF_REF_LEN {
            return Err(TradeError::Validation(format!(
                "proof reference must be 1..={} bytes",
                MAX_PROOF_REF_LEN
            )));
        }

        let trade = {
            let _guard = self.ctx.trade_locks.lock(&trade_id).await;
            let trade = self.ctx.load_trade(trade_id).await?;
            if trade.buyer_id != payer_id {
                return Err(TradeError::Forbidden);
            }
            if trade.payment_proof_ref.is_some() {
                return Err(TradeError::DuplicateProofSubmission);
            }
            if trade.status != TradeStatus::CryptoReceived {
                return Err(blocked(&trade, "submit payment proof"));
            }

            let now = self.ctx.clock.now();
            let patch = TradePatch {
                payment_proof_ref: Some(proof_ref),
                payment_submitted_at: Some(now),
                ..TradePatch::none()
            };
            self.advance(&trade, TradeStatus::PaymentSubmitted, &patch).await?
        };

        self.ctx.notifier.emit(Notification::user(
            trade.seller_id,
            NotificationKind::PaymentSubmitted,
            json!({ "trade_id": trade.id, "fiat_amount": trade.fiat_amount }),
        ));
        Ok(trade)
    }

    /// Seller confirms the fiat arrived
    pub async fn confirm_receipt(
        &self,
        trade_id: TradeId,
        payee_id: UserId,
    ) -> Result<Trade, TradeError> {
        let trade = {
            let _guard = self.ctx.trade_locks.lock(&trade_id).await;
            let trade = self.ctx.load_trade(trade_id).await?;
            if trade.seller_id != payee_id {
                return Err(TradeError::Forbidden);
            }
            if trade.status != TradeStatus::PaymentSubmitted {
                return Err(blocked(&trade, "confirm payment"));
            }

            let patch = TradePatch {
                payment_confirmed_at: Some(self.ctx.clock.now()),
                ..TradePatch::none()
            };
            self.advance(&trade, TradeStatus::PaymentConfirmed, &patch).await?
        };

        self.ctx.notifier.emit(Notification::user(
            trade.buyer_id,
            NotificationKind::PaymentConfirmed,
            json!({ "trade_id": trade.id }),
        ));
        Ok(trade)
    }

    /// Either party escalates a funded trade to the operator
    pub async fn raise_dispute(
        &self,
        trade_id: TradeId,
        party_id: UserId,
        reason: String,
    ) -> Result<Trade, TradeError> {
        let reason = reason.trim().to_string();
        if reason.is_empty() || reason.len() > MAX_REASON_LEN {
            return Err(TradeError::Validation(format!(
                "dispute reason must be 1..={} bytes",
                MAX_REASON_LEN
            )));
        }

        let trade = {
            let _guard = self.ctx.trade_locks.lock(&trade_id).await;
            let trade = self.ctx.load_trade(trade_id).await?;
            if !trade.is_party(party_id) {
                return Err(TradeError::Forbidden);
            }
            if !trade.status.can_transition_to(TradeStatus::Disputed) {
                return Err(blocked(&trade, "raise dispute"));
            }
            self.dispute(&trade, reason.clone(), Some(party_id)).await?
        };

        let counterparty = if party_id == trade.seller_id {
            trade.buyer_id
        } else {
            trade.seller_id
        };
        let payload = json!({ "trade_id": trade.id, "reason": reason, "raised_by": party_id });
        self.ctx.notifier.emit_all(vec![
            Notification::operator(NotificationKind::TradeDisputed, payload.clone()),
            Notification::user(counterparty, NotificationKind::TradeDisputed, payload),
        ]);
        Ok(trade)
    }

    /// Move stalled fiat legs to dispute
    ///
    /// `crypto_received` past the payment window (no proof) and
    /// `payment_submitted` past the confirmation window (no confirmation).
    pub async fn sweep_payment_timeouts(&self, limit: usize) -> Result<usize, TradeError> {
        let now = self.ctx.clock.now();
        let candidates = self
            .ctx
            .store
            .list_trades(&[TradeStatus::CryptoReceived, TradeStatus::PaymentSubmitted])
            .await?;

        let stalled = candidates.into_iter().filter_map(|t| {
            let reason = match t.status {
                TradeStatus::CryptoReceived => {
                    let since = t.funded_at.unwrap_or(t.created_at);
                    (now - since >= self.config.payment_window())
                        .then_some("payment window elapsed without proof")
                }
                TradeStatus::PaymentSubmitted => {
                    let since = t.payment_submitted_at.unwrap_or(t.updated_at);
                    (now - since >= self.config.confirmation_window())
                        .then_some("confirmation window elapsed")
                }
                _ => None,
            }?;
            Some((t, reason))
        });

        let mut disputed = 0;
        for (trade, reason) in stalled.take(limit) {
            let moved = {
                let _guard = self.ctx.trade_locks.lock(&trade.id).await;
                self.dispute(&trade, reason.to_string(), None).await
            };
            match moved {
                Ok(trade) => {
                    disputed += 1;
                    self.ctx.notifier.emit(Notification::operator(
                        NotificationKind::TradeDisputed,
                        json!({ "trade_id": trade.id, "reason": reason }),
                    ));
                }
                // Moved by another writer or claimed by a release; re-read next sweep
                Err(TradeError::InvalidStateTransition(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(disputed)
    }

    /// Caller holds the trade lock
    ///
    /// Refused while a release transfer is out; the release decides the trade.
    async fn dispute(
        &self,
        trade: &Trade,
        reason: String,
        raised_by: Option<UserId>,
    ) -> Result<Trade, TradeError> {
        if self.ctx.is_releasing(trade.id) {
            return Err(TradeError::InvalidStateTransition(format!(
                "release in progress for trade {}",
                trade.id
            )));
        }
        let patch = TradePatch::issue(TradeIssue::DisputeRaised {
            reason: reason.clone(),
            raised_by,
        });
        let updated = self.advance(trade, TradeStatus::Disputed, &patch).await?;
        warn!(
            trade_id = %trade.id,
            old_state = %trade.status,
            reason = %reason,
            raised_by = ?raised_by,
            "Trade disputed"
        );
        Ok(updated)
    }

    async fn advance(
        &self,
        trade: &Trade,
        to: TradeStatus,
        patch: &TradePatch,
    ) -> Result<Trade, TradeError> {
        let moved = self
            .ctx
            .store
            .transition_trade(trade.id, trade.status, to, patch, self.ctx.clock.now())
            .await?;
        if !moved {
            return Err(TradeError::InvalidStateTransition(format!(
                "trade {} is no longer {}",
                trade.id, trade.status
            )));
        }
        info!(trade_id = %trade.id, old_state = %trade.status, new_state = %to, "Trade transition");
        self.ctx.load_trade(trade.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TradeStore;
    use crate::notify::Recipient;
    use crate::trade::test_support::{BUYER, Harness, SELLER};

    #[tokio::test]
    async fn test_proof_requires_funded_escrow() {
        let h = Harness::new();
        let trade = h.open_trade().await;

        let err = h
            .desk
            .payments
            .submit_proof(trade.id, BUYER, "proof-1".into())
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_proof_only_from_buyer() {
        let h = Harness::new();
        let trade = h.funded_trade().await;

        let err = h
            .desk
            .payments
            .submit_proof(trade.id, SELLER, "proof-1".into())
            .await
            .unwrap_err();
        assert_eq!(err, TradeError::Forbidden);
    }

    #[tokio::test]
    async fn test_duplicate_proof_keeps_first() {
        let h = Harness::new();
        let trade = h.funded_trade().await;

        let submitted = h
            .desk
            .payments
            .submit_proof(trade.id, BUYER, "proof-1".into())
            .await
            .unwrap();
        assert_eq!(submitted.status, TradeStatus::PaymentSubmitted);

        let err = h
            .desk
            .payments
            .submit_proof(trade.id, BUYER, "proof-2".into())
            .await
            .unwrap_err();
        assert_eq!(err, TradeError::DuplicateProofSubmission);

        let stored = h.store.get_trade(trade.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_proof_ref.as_deref(), Some("proof-1"));
        assert_eq!(
            h.notifier
                .count_for(Recipient::User(SELLER), NotificationKind::PaymentSubmitted),
            1
        );
    }

    #[tokio::test]
    async fn test_confirm_receipt_only_seller() {
        let h = Harness::new();
        let trade = h.funded_trade().await;
        h.desk
            .payments
            .submit_proof(trade.id, BUYER, "proof-1".into())
            .await
            .unwrap();

        assert_eq!(
            h.desk.payments.confirm_receipt(trade.id, BUYER).await.unwrap_err(),
            TradeError::Forbidden
        );
        let confirmed = h.desk.payments.confirm_receipt(trade.id, SELLER).await.unwrap();
        assert_eq!(confirmed.status, TradeStatus::PaymentConfirmed);
        assert!(confirmed.payment_confirmed_at.is_some());
    }

    #[tokio::test]
    async fn test_dispute_needs_funded_trade() {
        let h = Harness::new();
        let trade = h.open_trade().await;
        let err = h
            .desk
            .payments
            .raise_dispute(trade.id, BUYER, "seller vanished".into())
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidState { .. }));

        let trade = h.funded_trade().await;
        let disputed = h
            .desk
            .payments
            .raise_dispute(trade.id, BUYER, "seller vanished".into())
            .await
            .unwrap();
        assert_eq!(disputed.status, TradeStatus::Disputed);
        assert_eq!(
            disputed.issue,
            Some(TradeIssue::DisputeRaised {
                reason: "seller vanished".into(),
                raised_by: Some(BUYER),
            })
        );
        assert_eq!(
            h.notifier
                .count_for(Recipient::Operator, NotificationKind::TradeDisputed),
            1
        );
        assert_eq!(
            h.notifier
                .count_for(Recipient::User(SELLER), NotificationKind::TradeDisputed),
            1
        );

        let again = h
            .desk
            .payments
            .raise_dispute(trade.id, SELLER, "me too".into())
            .await
            .unwrap_err();
        assert_eq!(again, TradeError::DisputeRaised("seller vanished".into()));
    }

    #[tokio::test]
    async fn test_confirmation_timeout_disputes() {
        let h = Harness::new();
        let trade = h.funded_trade().await;
        h.desk
            .payments
            .submit_proof(trade.id, BUYER, "proof-1".into())
            .await
            .unwrap();

        h.clock.advance_minutes(60);
        assert_eq!(h.desk.payments.sweep_payment_timeouts(100).await.unwrap(), 0);

        h.clock.advance_minutes(61);
        assert_eq!(h.desk.payments.sweep_payment_timeouts(100).await.unwrap(), 1);
        assert_eq!(h.desk.payments.sweep_payment_timeouts(100).await.unwrap(), 0);

        let stored = h.store.get_trade(trade.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TradeStatus::Disputed);
        assert_eq!(stored.payment_proof_ref.as_deref(), Some("proof-1"));
    }

    #[tokio::test]
    async fn test_payment_window_disputes() {
        let h = Harness::new();
        let trade = h.funded_trade().await;

        h.clock.advance_minutes(61);
        assert_eq!(h.desk.payments.sweep_payment_timeouts(100).await.unwrap(), 1);

        let stored = h.store.get_trade(trade.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TradeStatus::Disputed);
        assert!(matches!(
            stored.issue,
            Some(TradeIssue::DisputeRaised { raised_by: None, .. })
        ));
    }
}
