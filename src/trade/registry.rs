//! Trade Request Registry
//!
//! Creates, lists and expires open offers. Expiry is a state fact: reads
//! sweep lazily and the worker sweeps periodically, both through the same
//! idempotent store update.

use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info};

use super::error::TradeError;
use super::state::RequestStatus;
use super::types::{NewTradeRequest, RequestFilter, TradeRequest};
use super::TradeContext;
use crate::config::TradeConfig;
use crate::core_types::{DeliveryType, Direction, TradeRequestId, UserId};
use crate::notify::{Notification, NotificationKind, Recipient};

const MAX_NOTES_LEN: usize = 500;

pub struct TradeRequestRegistry {
    ctx: TradeContext,
    config: TradeConfig,
}

impl TradeRequestRegistry {
    pub fn new(ctx: TradeContext, config: TradeConfig) -> Self {
        Self { ctx, config }
    }

    /// Validate and open a new offer
    pub async fn create(
        &self,
        requester_id: UserId,
        mut spec: NewTradeRequest,
    ) -> Result<TradeRequest, TradeError> {
        if requester_id == 0 {
            return Err(TradeError::Forbidden);
        }
        self.validate(&spec)?;

        if spec.direction == Direction::Buy {
            let address = spec.receiving_address.as_deref().ok_or_else(|| {
                TradeError::Validation("buy requests need a receiving address".into())
            })?;
            if !self
                .ctx
                .custodian
                .validate_address(spec.asset_type, address)
                .await?
            {
                return Err(TradeError::Validation(format!(
                    "invalid {} receiving address",
                    spec.asset_type
                )));
            }
        }

        spec.candidate_ids.retain(|id| *id != requester_id);
        spec.candidate_ids.sort_unstable();
        spec.candidate_ids.dedup();

        let now = self.ctx.clock.now();
        let req = TradeRequest::new(requester_id, spec, now, now + self.config.request_ttl());
        self.ctx.store.insert_request(&req).await?;

        info!(
            request_id = %req.id,
            requester_id = requester_id,
            direction = %req.direction,
            asset = %req.asset_type,
            amount = %req.asset_amount,
            payment_method = %req.payment_method,
            "Trade request opened"
        );
        Ok(req)
    }

    fn validate(&self, spec: &NewTradeRequest) -> Result<(), TradeError> {
        if spec.asset_amount <= Decimal::ZERO {
            return Err(TradeError::Validation("asset_amount must be positive".into()));
        }
        if spec.asset_amount.normalize().scale() > spec.asset_type.decimals() {
            return Err(TradeError::Validation(format!(
                "asset_amount exceeds {} decimal places for {}",
                spec.asset_type.decimals(),
                spec.asset_type
            )));
        }
        if spec.fiat_amount <= Decimal::ZERO || spec.rate <= Decimal::ZERO {
            return Err(TradeError::Validation(
                "fiat_amount and rate must be positive".into(),
            ));
        }

        let implied = spec
            .asset_amount
            .checked_mul(spec.rate)
            .ok_or_else(|| TradeError::Validation("amount overflow".into()))?;
        let tolerance =
            spec.fiat_amount * Decimal::from(self.config.rate_tolerance_bps) / Decimal::from(10_000);
        if (implied - spec.fiat_amount).abs() > tolerance {
            return Err(TradeError::Validation(format!(
                "fiat_amount {} inconsistent with asset_amount × rate = {}",
                spec.fiat_amount, implied
            )));
        }

        if !self
            .config
            .supported_payment_methods
            .contains(&spec.payment_method)
        {
            return Err(TradeError::Validation(format!(
                "payment method {} not supported",
                spec.payment_method
            )));
        }

        match (spec.payment_method.delivery_type(), &spec.handoff) {
            (None, Some(_)) => {
                return Err(TradeError::Validation(
                    "handoff details only apply to cash payment methods".into(),
                ));
            }
            (Some(_), None) => {
                return Err(TradeError::Validation(
                    "cash payment methods need handoff details".into(),
                ));
            }
            (Some(kind), Some(handoff)) => {
                if handoff.amount_usd <= Decimal::ZERO {
                    return Err(TradeError::Validation(
                        "handoff amount_usd must be positive".into(),
                    ));
                }
                let has_address = handoff
                    .address_payload
                    .as_ref()
                    .is_some_and(|v| !v.is_null());
                if kind == DeliveryType::Delivery && !has_address {
                    return Err(TradeError::Validation(
                        "cash delivery needs an address".into(),
                    ));
                }
            }
            (None, None) => {}
        }

        if spec.direction == Direction::Sell && spec.receiving_address.is_some() {
            return Err(TradeError::Validation(
                "sell requests take the buyer's address on accept".into(),
            ));
        }

        if spec.notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(TradeError::Validation(format!(
                "notes longer than {} bytes",
                MAX_NOTES_LEN
            )));
        }

        Ok(())
    }

    /// Load a request, expiring it first if its deadline has passed
    pub async fn get(&self, id: TradeRequestId) -> Result<TradeRequest, TradeError> {
        let mut req = self
            .ctx
            .store
            .get_request(id)
            .await?
            .ok_or_else(|| TradeError::NotFound("Trade request", id.to_string()))?;

        let now = self.ctx.clock.now();
        if req.status == RequestStatus::Open && !req.is_live(now) {
            self.ctx
                .store
                .transition_request(id, RequestStatus::Open, RequestStatus::Expired, None)
                .await?;
            req.status = RequestStatus::Expired;
        }
        Ok(req)
    }

    /// Live offers visible to `caller`: not their own, not declined by them
    pub async fn list_open(
        &self,
        caller: UserId,
        filter: &RequestFilter,
    ) -> Result<Vec<TradeRequest>, TradeError> {
        self.expire().await?;

        let now = self.ctx.clock.now();
        let declined = self.ctx.store.declined_by(caller).await?;
        let open = self.ctx.store.list_requests(RequestStatus::Open).await?;

        Ok(open
            .into_iter()
            .filter(|r| r.is_live(now))
            .filter(|r| r.requester_id != caller)
            .filter(|r| !declined.contains(&r.id))
            .filter(|r| filter.matches(r))
            .collect())
    }

    /// Every request `requester_id` ever opened, any status
    pub async fn list_mine(&self, requester_id: UserId) -> Result<Vec<TradeRequest>, TradeError> {
        self.expire().await?;
        Ok(self
            .ctx
            .store
            .list_requests_by_requester(requester_id)
            .await?)
    }

    /// Withdraw an open offer. Requester only.
    pub async fn cancel(
        &self,
        id: TradeRequestId,
        requester_id: UserId,
    ) -> Result<TradeRequest, TradeError> {
        let req = self.get(id).await?;
        if req.requester_id != requester_id {
            return Err(TradeError::Forbidden);
        }

        match req.status {
            RequestStatus::Cancelled => return Ok(req),
            RequestStatus::Expired => return Err(TradeError::Expired),
            RequestStatus::Accepted => return Err(TradeError::RaceLost),
            RequestStatus::Open => {}
        }

        let now = self.ctx.clock.now();
        let cancelled = self
            .ctx
            .store
            .transition_request(id, RequestStatus::Open, RequestStatus::Cancelled, Some(now))
            .await?;

        let req = self.get(id).await?;
        if !cancelled {
            return match req.status {
                RequestStatus::Cancelled => Ok(req),
                RequestStatus::Expired => Err(TradeError::Expired),
                _ => Err(TradeError::RaceLost),
            };
        }

        info!(request_id = %id, "Trade request cancelled");
        self.ctx.notifier.emit(Notification::new(
            Recipient::Broadcast,
            NotificationKind::OfferWithdrawn,
            json!({ "request_id": id, "reason": "cancelled" }),
        ));
        Ok(req)
    }

    /// Idempotent sweep: every open request past its deadline → expired
    pub async fn expire(&self) -> Result<Vec<TradeRequestId>, TradeError> {
        let now = self.ctx.clock.now();
        let expired = self.ctx.store.expire_requests(now).await?;

        if expired.is_empty() {
            debug!("No trade requests to expire");
        } else {
            info!(count = expired.len(), "Expired trade requests");
            for id in &expired {
                self.ctx.notifier.emit(Notification::new(
                    Recipient::Broadcast,
                    NotificationKind::OfferWithdrawn,
                    json!({ "request_id": id, "reason": "expired" }),
                ));
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{AssetType, PaymentMethod};
    use crate::trade::test_support::{BUYER, BUYER_BTC_ADDRESS, Harness, SELLER};
    use crate::trade::types::HandoffDetails;

    #[tokio::test]
    async fn test_create_opens_with_ttl() {
        let h = Harness::new();
        let req = h.desk.registry.create(SELLER, h.sell_spec()).await.unwrap();
        assert_eq!(req.status, RequestStatus::Open);
        assert_eq!(req.expires_at - req.created_at, chrono::Duration::minutes(10));
    }

    #[tokio::test]
    async fn test_create_rejects_non_positive_amount() {
        let h = Harness::new();
        let mut spec = h.sell_spec();
        spec.asset_amount = Decimal::ZERO;
        let err = h.desk.registry.create(SELLER, spec).await.unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_rate_mismatch() {
        let h = Harness::new();
        let mut spec = h.sell_spec();
        spec.fiat_amount = Decimal::from(1_600_000);
        let err = h.desk.registry.create(SELLER, spec).await.unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_accepts_drift_inside_tolerance() {
        let h = Harness::new();
        let mut spec = h.sell_spec();
        // 50 bps of 1_500_000 = 7_500
        spec.fiat_amount = Decimal::from(1_507_000);
        assert!(h.desk.registry.create(SELLER, spec).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_rejects_excess_precision() {
        let h = Harness::new();
        let mut spec = h.sell_spec();
        spec.asset_amount = Decimal::new(1, 9);
        spec.fiat_amount = spec.asset_amount * spec.rate;
        let err = h.desk.registry.create(SELLER, spec).await.unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cash_request_requires_handoff() {
        let h = Harness::new();
        let mut spec = h.sell_spec();
        spec.payment_method = PaymentMethod::CashDelivery;
        let err = h.desk.registry.create(SELLER, spec.clone()).await.unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)));

        spec.handoff = Some(HandoffDetails {
            amount_usd: Decimal::from(1_000),
            address_payload: None,
        });
        let err = h.desk.registry.create(SELLER, spec.clone()).await.unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)));

        spec.handoff = Some(HandoffDetails {
            amount_usd: Decimal::from(1_000),
            address_payload: Some(serde_json::json!({"street": "12 Marina Rd"})),
        });
        assert!(h.desk.registry.create(SELLER, spec).await.is_ok());
    }

    #[tokio::test]
    async fn test_buy_request_requires_valid_address() {
        let h = Harness::new();
        let mut spec = h.sell_spec();
        spec.direction = Direction::Buy;
        let err = h.desk.registry.create(BUYER, spec.clone()).await.unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)));

        spec.receiving_address = Some("not-an-address".into());
        let err = h.desk.registry.create(BUYER, spec.clone()).await.unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)));

        spec.receiving_address = Some(BUYER_BTC_ADDRESS.into());
        let req = h.desk.registry.create(BUYER, spec).await.unwrap();
        assert_eq!(req.asset_type, AssetType::Btc);
    }

    #[tokio::test]
    async fn test_list_open_hides_own_and_declined() {
        let h = Harness::new();
        let a = h.desk.registry.create(SELLER, h.sell_spec()).await.unwrap();
        let b = h.desk.registry.create(SELLER, h.sell_spec()).await.unwrap();

        let own = h
            .desk
            .registry
            .list_open(SELLER, &RequestFilter::default())
            .await
            .unwrap();
        assert!(own.is_empty());

        h.desk.matching.decline(a.id, BUYER).await.unwrap();
        let visible = h
            .desk
            .registry
            .list_open(BUYER, &RequestFilter::default())
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, b.id);

        let stored = h.desk.registry.get(a.id).await.unwrap();
        assert_eq!(stored.status, RequestStatus::Open);
    }

    #[tokio::test]
    async fn test_expiry_is_lazy_and_idempotent() {
        let h = Harness::new();
        let req = h.desk.registry.create(SELLER, h.sell_spec()).await.unwrap();

        h.clock.advance_minutes(10);
        let loaded = h.desk.registry.get(req.id).await.unwrap();
        assert_eq!(loaded.status, RequestStatus::Expired);

        assert!(h.desk.registry.expire().await.unwrap().is_empty());
        let visible = h
            .desk
            .registry
            .list_open(BUYER, &RequestFilter::default())
            .await
            .unwrap();
        assert!(visible.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_requester_only() {
        let h = Harness::new();
        let req = h.desk.registry.create(SELLER, h.sell_spec()).await.unwrap();

        let err = h.desk.registry.cancel(req.id, BUYER).await.unwrap_err();
        assert_eq!(err, TradeError::Forbidden);

        let cancelled = h.desk.registry.cancel(req.id, SELLER).await.unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);

        let mine = h.desk.registry.list_mine(SELLER).await.unwrap();
        assert_eq!(mine.len(), 1);
    }
}
