//! Trade Desk
//!
//! Wires the lifecycle components over one [`TradeContext`]. The gateway and
//! the background worker both hold an `Arc<TradeDesk>`.

use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::config::{TradeConfig, VendorConfig};
use crate::core_types::{TradeId, UserId};
use crate::trade::{
    EscrowVaultManager, MatchingCoordinator, PaymentConfirmationTracker, ReleaseEngine, Trade,
    TradeContext, TradeError, TradeRequestRegistry,
};
use crate::vendor::{VendorJob, VendorJobDispatcher};

/// A trade as seen by one of its participants
#[derive(Debug, Clone, Serialize)]
pub struct TradeView {
    #[serde(flatten)]
    pub trade: Trade,
    /// Machine-readable code of the recorded fact, if any
    pub issue_code: Option<&'static str>,
    pub vendor_job: Option<VendorJob>,
}

pub struct TradeDesk {
    pub ctx: TradeContext,
    pub registry: Arc<TradeRequestRegistry>,
    pub matching: Arc<MatchingCoordinator>,
    pub escrow: Arc<EscrowVaultManager>,
    pub payments: Arc<PaymentConfirmationTracker>,
    pub release: Arc<ReleaseEngine>,
    pub vendors: Arc<VendorJobDispatcher>,
}

impl TradeDesk {
    pub fn new(ctx: TradeContext, trade_config: TradeConfig, vendor_config: VendorConfig) -> Self {
        let vendors = Arc::new(VendorJobDispatcher::new(
            ctx.store.clone(),
            ctx.notifier.clone(),
            ctx.clock.clone(),
            vendor_config,
        ));
        let escrow = Arc::new(EscrowVaultManager::new(ctx.clone(), trade_config.clone()));
        let matching = Arc::new(MatchingCoordinator::new(
            ctx.clone(),
            escrow.clone(),
            vendors.clone(),
        ));

        Self {
            registry: Arc::new(TradeRequestRegistry::new(ctx.clone(), trade_config.clone())),
            matching,
            escrow,
            payments: Arc::new(PaymentConfirmationTracker::new(ctx.clone(), trade_config)),
            release: Arc::new(ReleaseEngine::new(ctx.clone(), vendors.clone())),
            vendors,
            ctx,
        }
    }

    /// Current trade state with its recorded fact and handoff job
    ///
    /// Visible to both parties and to the assigned vendor.
    pub async fn trade_state(&self, trade_id: TradeId, viewer: UserId) -> Result<TradeView, TradeError> {
        let trade = self.ctx.load_trade(trade_id).await?;
        let job = self.ctx.store.get_job_by_trade(trade_id).await?;

        let is_vendor = job.as_ref().is_some_and(|j| j.vendor_id == viewer);
        if !trade.is_party(viewer) && !is_vendor {
            return Err(TradeError::Forbidden);
        }
        let vendor_job = match job {
            Some(_) => self.vendors.get_by_trade(trade_id, viewer).await?,
            None => None,
        };

        Ok(TradeView {
            issue_code: trade.issue.as_ref().map(|i| i.code()),
            trade,
            vendor_job,
        })
    }

    /// Seller confirms the fiat, then the release is attempted right away
    ///
    /// A release that cannot run yet (cash handoff pending, provider down) is
    /// left to the worker; the confirmation itself still stands.
    pub async fn confirm_receipt(&self, trade_id: TradeId, payee_id: UserId) -> Result<Trade, TradeError> {
        let confirmed = self.payments.confirm_receipt(trade_id, payee_id).await?;
        match self.release.release(trade_id).await {
            Ok(completed) => Ok(completed),
            Err(e) => {
                warn!(trade_id = %trade_id, error = %e, "Release deferred after confirmation");
                match self.ctx.store.get_trade(trade_id).await? {
                    Some(trade) => Ok(trade),
                    None => Ok(confirmed),
                }
            }
        }
    }
}
