//! Trade Worker
//!
//! Background sweeps that move trades forward without a caller: request
//! expiry, escrow provisioning retry, funding polls, timeouts, and release
//! retry. Every step is idempotent, so redundant workers are safe.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::error::TradeError;
use super::state::{EscrowStatus, TradeStatus};
use crate::config::EscrowConfig;
use crate::desk::TradeDesk;

/// Configuration for the trade worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to run a sweep
    pub scan_interval: Duration,
    /// Maximum trades handled per step per sweep
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            batch_size: 100,
        }
    }
}

impl From<&EscrowConfig> for WorkerConfig {
    fn from(escrow: &EscrowConfig) -> Self {
        Self {
            scan_interval: escrow.poll_interval(),
            batch_size: escrow.sweep_batch_size,
        }
    }
}

/// What one sweep changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub provisioned: usize,
    pub jobs_created: usize,
    pub funded: usize,
    pub funding_timeouts: usize,
    pub disputed: usize,
    pub released: usize,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

pub struct TradeWorker {
    desk: Arc<TradeDesk>,
    config: WorkerConfig,
}

impl TradeWorker {
    pub fn new(desk: Arc<TradeDesk>, config: WorkerConfig) -> Self {
        Self { desk, config }
    }

    /// Run the sweep loop forever
    pub async fn run(&self) {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Starting trade worker"
        );

        let mut ticker = tokio::time::interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(report) if !report.is_idle() => info!(?report, "Trade sweep"),
                Ok(_) => debug!("Trade sweep idle"),
                Err(e) => error!(error = %e, "Trade sweep failed"),
            }
        }
    }

    /// One pass over every step
    ///
    /// Per-trade failures are logged and skipped; only a store failure
    /// listing candidates aborts the pass.
    pub async fn run_once(&self) -> Result<SweepReport, TradeError> {
        let desk = &self.desk;
        let limit = self.config.batch_size;
        let mut report = SweepReport {
            expired: desk.registry.expire().await?.len(),
            ..SweepReport::default()
        };

        let awaiting = desk
            .ctx
            .store
            .list_trades(&[TradeStatus::PendingEscrow, TradeStatus::CryptoDeposited])
            .await?;

        for trade in awaiting
            .iter()
            .filter(|t| t.status == TradeStatus::PendingEscrow && t.escrow_address.is_none())
            .take(limit)
        {
            match desk.escrow.provision(trade.id).await {
                Ok(_) => report.provisioned += 1,
                Err(e) => error!(trade_id = %trade.id, error = %e, "Escrow provisioning retry failed"),
            }
        }

        report.jobs_created = self.ensure_vendor_jobs(limit).await?;

        for trade in awaiting
            .iter()
            .filter(|t| t.escrow_address.is_some())
            .take(limit)
        {
            match desk.escrow.poll_funding(trade.id).await {
                Ok(polled) if polled.escrow_status == EscrowStatus::Funded => report.funded += 1,
                Ok(_) => {}
                Err(e) => error!(trade_id = %trade.id, error = %e, "Funding poll failed"),
            }
        }

        report.funding_timeouts = desk.escrow.sweep_funding_timeouts(limit).await?;
        report.disputed = desk.payments.sweep_payment_timeouts(limit).await?;

        let confirmed = desk
            .ctx
            .store
            .list_trades(&[TradeStatus::PaymentConfirmed])
            .await?;
        for trade in confirmed.iter().take(limit) {
            if desk.ctx.is_releasing(trade.id) || !desk.release.is_releasable(trade).await? {
                continue;
            }
            match desk.release.release(trade.id).await {
                Ok(_) => report.released += 1,
                Err(e) => error!(trade_id = %trade.id, error = %e, "Release retry failed"),
            }
        }

        desk.ctx.trade_locks.prune();
        Ok(report)
    }

    /// Re-create handoff jobs that failed to spawn at accept time
    async fn ensure_vendor_jobs(&self, limit: usize) -> Result<usize, TradeError> {
        let desk = &self.desk;
        let live = desk
            .ctx
            .store
            .list_trades(&[
                TradeStatus::PendingEscrow,
                TradeStatus::CryptoDeposited,
                TradeStatus::CryptoReceived,
                TradeStatus::PaymentSubmitted,
                TradeStatus::PaymentConfirmed,
            ])
            .await?;

        let mut created = 0;
        for trade in live.iter().filter(|t| t.requires_handoff()).take(limit) {
            if desk.ctx.store.get_job_by_trade(trade.id).await?.is_some() {
                continue;
            }
            let Some(handoff) = desk
                .ctx
                .store
                .get_request(trade.trade_request_id)
                .await?
                .and_then(|req| req.handoff)
            else {
                error!(trade_id = %trade.id, "Cash trade has no handoff details");
                continue;
            };
            match desk.vendors.create_for_trade(trade, &handoff).await {
                Ok(_) => created += 1,
                Err(e) => error!(trade_id = %trade.id, error = %e, "Vendor job retry failed"),
            }
        }
        Ok(created)
    }
}
