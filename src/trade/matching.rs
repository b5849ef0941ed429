//! Matching Coordinator
//!
//! Resolves accept races. The request CAS and the trade insert are one store
//! operation, so among N concurrent accepts exactly one creates a trade and
//! every other caller sees `RaceLost` (or `Expired`).

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::TradeError;
use super::escrow::EscrowVaultManager;
use super::state::RequestStatus;
use super::types::{Trade, TradeRequest};
use super::TradeContext;
use crate::core_types::{Direction, TradeRequestId, UserId};
use crate::notify::{Notification, NotificationKind, Recipient};
use crate::vendor::{VendorJob, VendorJobDispatcher};

/// Result of a winning accept
#[derive(Debug, Clone, Serialize)]
pub struct AcceptOutcome {
    pub trade: Trade,
    pub vendor_job: Option<VendorJob>,
}

pub struct MatchingCoordinator {
    ctx: TradeContext,
    escrow: Arc<EscrowVaultManager>,
    vendors: Arc<VendorJobDispatcher>,
}

impl MatchingCoordinator {
    pub fn new(
        ctx: TradeContext,
        escrow: Arc<EscrowVaultManager>,
        vendors: Arc<VendorJobDispatcher>,
    ) -> Self {
        Self {
            ctx,
            escrow,
            vendors,
        }
    }

    /// Accept an open offer
    ///
    /// `receiving_address` is the accepting buyer's address on a sell offer;
    /// buy offers already carry the requester's address.
    pub async fn accept(
        &self,
        request_id: TradeRequestId,
        counterparty_id: UserId,
        receiving_address: Option<String>,
    ) -> Result<AcceptOutcome, TradeError> {
        let req = self
            .ctx
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| TradeError::NotFound("Trade request", request_id.to_string()))?;

        if counterparty_id == 0 {
            return Err(TradeError::Forbidden);
        }
        if req.requester_id == counterparty_id {
            return Err(TradeError::Validation(
                "cannot accept your own request".into(),
            ));
        }

        // Fail fast without touching the CAS
        let now = self.ctx.clock.now();
        match req.status {
            RequestStatus::Open if !req.is_live(now) => return Err(TradeError::Expired),
            RequestStatus::Open => {}
            RequestStatus::Expired => return Err(TradeError::Expired),
            RequestStatus::Accepted | RequestStatus::Cancelled => {
                return Err(TradeError::RaceLost);
            }
        }

        if req.payment_method.requires_handoff() && !self.vendors.has_vendors() {
            return Err(TradeError::Validation(
                "no cash vendor available for this payment method".into(),
            ));
        }

        let receiving_address = self.resolve_receiving_address(&req, receiving_address).await?;

        let now = self.ctx.clock.now();
        let trade = Trade::from_request(&req, counterparty_id, receiving_address, now);
        if !self
            .ctx
            .store
            .accept_request(request_id, now, &trade)
            .await?
        {
            return Err(self.lost_reason(request_id).await);
        }

        info!(
            request_id = %request_id,
            trade_id = %trade.id,
            seller_id = trade.seller_id,
            buyer_id = trade.buyer_id,
            state = %trade.status,
            "Trade request accepted"
        );

        let vendor_job = match &req.handoff {
            Some(handoff) if trade.requires_handoff() => {
                match self.vendors.create_for_trade(&trade, handoff).await {
                    Ok(job) => Some(job),
                    Err(e) => {
                        // Worker re-creates missing jobs for live cash trades
                        warn!(trade_id = %trade.id, error = %e, "Vendor job creation deferred");
                        None
                    }
                }
            }
            _ => None,
        };

        self.notify_accepted(&req, &trade, counterparty_id);

        if let Err(e) = self.escrow.provision(trade.id).await {
            warn!(trade_id = %trade.id, error = %e, "Escrow provisioning deferred to worker");
        }

        let trade = self.ctx.load_trade(trade.id).await?;
        Ok(AcceptOutcome { trade, vendor_job })
    }

    /// Hide an offer from `counterparty_id`. The request itself is untouched.
    pub async fn decline(
        &self,
        request_id: TradeRequestId,
        counterparty_id: UserId,
    ) -> Result<(), TradeError> {
        let req = self
            .ctx
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| TradeError::NotFound("Trade request", request_id.to_string()))?;

        if req.requester_id == counterparty_id {
            return Err(TradeError::Validation(
                "cannot decline your own request".into(),
            ));
        }

        self.ctx
            .store
            .record_decline(request_id, counterparty_id)
            .await?;
        info!(request_id = %request_id, user_id = counterparty_id, "Trade request declined");
        Ok(())
    }

    async fn resolve_receiving_address(
        &self,
        req: &TradeRequest,
        supplied: Option<String>,
    ) -> Result<String, TradeError> {
        match req.direction {
            Direction::Buy => req.receiving_address.clone().ok_or_else(|| {
                TradeError::InvalidStateTransition(format!(
                    "buy request {} has no receiving address",
                    req.id
                ))
            }),
            Direction::Sell => {
                let address = supplied
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| {
                        TradeError::Validation("receiving_address is required".into())
                    })?;
                if !self
                    .ctx
                    .custodian
                    .validate_address(req.asset_type, &address)
                    .await?
                {
                    return Err(TradeError::Validation(format!(
                        "invalid {} receiving address",
                        req.asset_type
                    )));
                }
                Ok(address)
            }
        }
    }

    /// Why a lost CAS lost: expiry beats a generic race
    async fn lost_reason(&self, request_id: TradeRequestId) -> TradeError {
        let now = self.ctx.clock.now();
        match self.ctx.store.get_request(request_id).await {
            Ok(Some(req)) if req.status == RequestStatus::Expired => TradeError::Expired,
            Ok(Some(req)) if req.status == RequestStatus::Open && !req.is_live(now) => {
                TradeError::Expired
            }
            Ok(_) => TradeError::RaceLost,
            Err(e) => e.into(),
        }
    }

    fn notify_accepted(&self, req: &TradeRequest, trade: &Trade, counterparty_id: UserId) {
        let mut out = vec![Notification::user(
            req.requester_id,
            NotificationKind::OfferAccepted,
            json!({
                "request_id": req.id,
                "trade_id": trade.id,
                "counterparty_id": counterparty_id,
            }),
        )];

        for candidate in req.candidate_ids.iter().filter(|c| **c != counterparty_id) {
            out.push(Notification::user(
                *candidate,
                NotificationKind::OfferWithdrawn,
                json!({ "request_id": req.id, "reason": "accepted" }),
            ));
        }

        out.push(Notification::new(
            Recipient::Broadcast,
            NotificationKind::OfferWithdrawn,
            json!({ "request_id": req.id, "reason": "accepted" }),
        ));

        self.ctx.notifier.emit_all(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TradeStore;
    use crate::core_types::PaymentMethod;
    use crate::trade::state::TradeStatus;
    use crate::trade::test_support::{BUYER, BUYER_BTC_ADDRESS, Harness, SELLER};
    use crate::trade::types::HandoffDetails;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_accept_sell_request_assigns_sides() {
        let h = Harness::new();
        let req = h.desk.registry.create(SELLER, h.sell_spec()).await.unwrap();

        let outcome = h
            .desk
            .matching
            .accept(req.id, BUYER, Some(BUYER_BTC_ADDRESS.into()))
            .await
            .unwrap();

        assert_eq!(outcome.trade.seller_id, SELLER);
        assert_eq!(outcome.trade.buyer_id, BUYER);
        assert_eq!(outcome.trade.status, TradeStatus::PendingEscrow);
        assert!(outcome.trade.escrow_address.is_some());
        assert!(outcome.vendor_job.is_none());

        let req = h.desk.registry.get(req.id).await.unwrap();
        assert_eq!(req.status, RequestStatus::Accepted);
    }

    #[tokio::test]
    async fn test_accept_own_request_rejected() {
        let h = Harness::new();
        let req = h.desk.registry.create(SELLER, h.sell_spec()).await.unwrap();
        let err = h
            .desk
            .matching
            .accept(req.id, SELLER, Some(BUYER_BTC_ADDRESS.into()))
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_accept_after_accept_is_race_lost() {
        let h = Harness::new();
        let req = h.desk.registry.create(SELLER, h.sell_spec()).await.unwrap();
        h.desk
            .matching
            .accept(req.id, BUYER, Some(BUYER_BTC_ADDRESS.into()))
            .await
            .unwrap();

        let err = h
            .desk
            .matching
            .accept(req.id, BUYER + 1, Some(BUYER_BTC_ADDRESS.into()))
            .await
            .unwrap_err();
        assert_eq!(err, TradeError::RaceLost);
    }

    #[tokio::test]
    async fn test_accept_expired_request() {
        let h = Harness::new();
        let req = h.desk.registry.create(SELLER, h.sell_spec()).await.unwrap();
        h.clock.advance_minutes(11);

        let err = h
            .desk
            .matching
            .accept(req.id, BUYER, Some(BUYER_BTC_ADDRESS.into()))
            .await
            .unwrap_err();
        assert_eq!(err, TradeError::Expired);
        assert!(
            h.store
                .get_trade_by_request(req.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_sell_accept_requires_address() {
        let h = Harness::new();
        let req = h.desk.registry.create(SELLER, h.sell_spec()).await.unwrap();
        let err = h.desk.matching.accept(req.id, BUYER, None).await.unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)));

        let req = h.desk.registry.get(req.id).await.unwrap();
        assert_eq!(req.status, RequestStatus::Open);
    }

    #[tokio::test]
    async fn test_accept_notifies_requester_candidates_and_board() {
        let h = Harness::new();
        let mut spec = h.sell_spec();
        spec.candidate_ids = vec![BUYER, 77, 78];
        let req = h.desk.registry.create(SELLER, spec).await.unwrap();

        h.desk
            .matching
            .accept(req.id, BUYER, Some(BUYER_BTC_ADDRESS.into()))
            .await
            .unwrap();

        let n = &h.notifier;
        assert_eq!(
            n.count_for(Recipient::User(SELLER), NotificationKind::OfferAccepted),
            1
        );
        assert_eq!(
            n.count_for(Recipient::User(77), NotificationKind::OfferWithdrawn),
            1
        );
        assert_eq!(
            n.count_for(Recipient::User(BUYER), NotificationKind::OfferWithdrawn),
            0
        );
        assert_eq!(
            n.count_for(Recipient::Broadcast, NotificationKind::OfferWithdrawn),
            1
        );
    }

    #[tokio::test]
    async fn test_cash_accept_spawns_vendor_job() {
        let h = Harness::new();
        let mut spec = h.sell_spec();
        spec.payment_method = PaymentMethod::CashPickup;
        spec.handoff = Some(HandoffDetails {
            amount_usd: Decimal::from(950),
            address_payload: None,
        });
        let req = h.desk.registry.create(SELLER, spec).await.unwrap();

        let outcome = h
            .desk
            .matching
            .accept(req.id, BUYER, Some(BUYER_BTC_ADDRESS.into()))
            .await
            .unwrap();

        let job = outcome.vendor_job.unwrap();
        assert_eq!(job.trade_id, outcome.trade.id);
        assert_eq!(job.payer_id, BUYER);
        assert_eq!(job.customer_id, SELLER);
        assert_eq!(job.amount_usd, Decimal::from(950));
    }

    #[tokio::test]
    async fn test_decline_keeps_request_open() {
        let h = Harness::new();
        let req = h.desk.registry.create(SELLER, h.sell_spec()).await.unwrap();
        h.desk.matching.decline(req.id, BUYER).await.unwrap();

        let req = h.desk.registry.get(req.id).await.unwrap();
        assert_eq!(req.status, RequestStatus::Open);

        // A decliner can still accept a request it hid
        assert!(
            h.desk
                .matching
                .accept(req.id, BUYER, Some(BUYER_BTC_ADDRESS.into()))
                .await
                .is_ok()
        );
    }
}
