//! Escrow Vault Manager
//!
//! One custodial deposit address per trade, funded by an exact-match
//! deposit. The custodian is queried outside the trade lock; the result is
//! applied under the lock against a fresh read.
//!
//! ```text
//! balance.confirmed == amount  → CRYPTO_RECEIVED (escrow funded), once
//! 0 < confirmed < amount       → fact: UnderfundedDeposit, stays put
//! confirmed > amount           → fact: OverfundedDeposit, operator notified once
//! confirmed == 0, pending > 0  → CRYPTO_DEPOSITED
//! ```

use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info, warn};

use super::error::TradeError;
use super::state::{EscrowStatus, TradeStatus};
use super::types::{Trade, TradeIssue, TradePatch};
use super::TradeContext;
use crate::config::TradeConfig;
use crate::core_types::TradeId;
use crate::custodian::Balance;
use crate::notify::{Notification, NotificationKind};

pub struct EscrowVaultManager {
    ctx: TradeContext,
    config: TradeConfig,
}

impl EscrowVaultManager {
    pub fn new(ctx: TradeContext, config: TradeConfig) -> Self {
        Self { ctx, config }
    }

    /// Bind a custodial deposit address to the trade
    ///
    /// Re-provisioning returns the recorded address.
    pub async fn provision(&self, trade_id: TradeId) -> Result<String, TradeError> {
        let trade = self.ctx.load_trade(trade_id).await?;
        if let Some(address) = trade.escrow_address {
            return Ok(address);
        }
        if trade.status != TradeStatus::PendingEscrow {
            return Err(TradeError::InvalidState {
                current: trade.status,
                action: "provision escrow",
            });
        }

        let address = self
            .ctx
            .custodian
            .create_vault(trade.asset_type, &trade_id.to_string())
            .await?;

        let bound = {
            let _guard = self.ctx.trade_locks.lock(&trade_id).await;
            self.ctx
                .store
                .bind_escrow_address(trade_id, &address, self.ctx.clock.now())
                .await?
        };

        if !bound {
            let trade = self.ctx.load_trade(trade_id).await?;
            return trade.escrow_address.ok_or_else(|| {
                TradeError::InvalidStateTransition(format!(
                    "escrow address for trade {} was not recorded",
                    trade_id
                ))
            });
        }

        info!(trade_id = %trade_id, address = %address, "Escrow vault provisioned");
        self.ctx.notifier.emit(Notification::user(
            trade.seller_id,
            NotificationKind::EscrowAwaitingDeposit,
            json!({
                "trade_id": trade_id,
                "escrow_address": address,
                "asset": trade.asset_type,
                "amount": trade.asset_amount,
            }),
        ));
        Ok(address)
    }

    /// Check the escrow balance and apply the funding policy
    ///
    /// Re-polling a funded trade is a no-op.
    pub async fn poll_funding(&self, trade_id: TradeId) -> Result<Trade, TradeError> {
        let trade = self.ctx.load_trade(trade_id).await?;
        if !trade.status.is_awaiting_funding() || trade.escrow_status == EscrowStatus::Funded {
            return Ok(trade);
        }
        let Some(address) = trade.escrow_address.clone() else {
            debug!(trade_id = %trade_id, "No escrow address yet, nothing to poll");
            return Ok(trade);
        };

        let balance = self
            .ctx
            .custodian
            .get_balance(trade.asset_type, &address)
            .await?;

        let (trade, notifications) = {
            let _guard = self.ctx.trade_locks.lock(&trade_id).await;
            let trade = self.ctx.load_trade(trade_id).await?;
            if !trade.status.is_awaiting_funding() {
                return Ok(trade);
            }
            self.apply_balance(trade, balance).await?
        };

        self.ctx.notifier.emit_all(notifications);
        Ok(trade)
    }

    /// Provider webhook: treat as a hint and poll the owning trade
    pub async fn on_deposit_callback(&self, address: &str) -> Result<Trade, TradeError> {
        let trade = self
            .ctx
            .store
            .get_trade_by_address(address)
            .await?
            .ok_or_else(|| TradeError::NotFound("Escrow address", address.to_string()))?;
        debug!(trade_id = %trade.id, address = address, "Deposit callback received");
        self.poll_funding(trade.id).await
    }

    /// Record `EscrowFundingTimeout` on trades still unfunded after the window
    ///
    /// The trade keeps its status and the request is not reopened.
    pub async fn sweep_funding_timeouts(&self, limit: usize) -> Result<usize, TradeError> {
        let now = self.ctx.clock.now();
        let deadline = self.config.funding_window();
        let candidates = self
            .ctx
            .store
            .list_trades(&[TradeStatus::PendingEscrow, TradeStatus::CryptoDeposited])
            .await?;

        let mut marked = 0;
        for trade in candidates
            .into_iter()
            .filter(|t| now - t.created_at >= deadline)
            .take(limit)
        {
            if !matches!(
                trade.issue,
                None | Some(TradeIssue::UnderfundedDeposit { .. })
            ) {
                continue;
            }

            let _guard = self.ctx.trade_locks.lock(&trade.id).await;
            let recorded = self
                .ctx
                .store
                .transition_trade(
                    trade.id,
                    trade.status,
                    trade.status,
                    &TradePatch::issue(TradeIssue::EscrowFundingTimeout),
                    now,
                )
                .await?;
            if recorded {
                warn!(trade_id = %trade.id, state = %trade.status, "Escrow funding window elapsed");
                marked += 1;
            }
        }
        Ok(marked)
    }

    /// Decide the funding outcome. Caller holds the trade lock.
    async fn apply_balance(
        &self,
        trade: Trade,
        balance: Balance,
    ) -> Result<(Trade, Vec<Notification>), TradeError> {
        let now = self.ctx.clock.now();
        let expected = trade.asset_amount;
        let mut notifications = Vec::new();

        let (to, patch) = if balance.confirmed == expected {
            let patch = TradePatch {
                escrow_status: Some(EscrowStatus::Funded),
                funded_at: Some(now),
                ..TradePatch::none()
            }
            .clear_issue();
            for user in [trade.seller_id, trade.buyer_id] {
                notifications.push(Notification::user(
                    user,
                    NotificationKind::EscrowFunded,
                    json!({ "trade_id": trade.id, "amount": expected }),
                ));
            }
            (TradeStatus::CryptoReceived, patch)
        } else if balance.confirmed > expected {
            let issue = TradeIssue::OverfundedDeposit {
                received: balance.confirmed,
            };
            if trade.issue.as_ref() == Some(&issue) {
                return Ok((trade, notifications));
            }
            let first_report = !matches!(trade.issue, Some(TradeIssue::OverfundedDeposit { .. }));
            if first_report {
                notifications.push(Notification::operator(
                    NotificationKind::EscrowOverfunded,
                    json!({
                        "trade_id": trade.id,
                        "expected": expected,
                        "received": balance.confirmed,
                    }),
                ));
            }
            (trade.status, TradePatch::issue(issue))
        } else {
            let to = if balance.pending > Decimal::ZERO && trade.status == TradeStatus::PendingEscrow
            {
                TradeStatus::CryptoDeposited
            } else {
                trade.status
            };
            let issue = if balance.confirmed > Decimal::ZERO {
                Some(TradeIssue::UnderfundedDeposit {
                    received: balance.confirmed,
                })
            } else {
                None
            };

            let issue_changed = issue.is_some() && trade.issue != issue;
            if to == trade.status && !issue_changed {
                return Ok((trade, notifications));
            }
            let patch = match issue {
                Some(issue) if issue_changed => TradePatch::issue(issue),
                _ => TradePatch::none(),
            };
            (to, patch)
        };

        let moved = self
            .ctx
            .store
            .transition_trade(trade.id, trade.status, to, &patch, now)
            .await?;
        if !moved {
            return Err(TradeError::InvalidStateTransition(format!(
                "trade {} changed while applying escrow balance",
                trade.id
            )));
        }

        let updated = self.ctx.load_trade(trade.id).await?;
        match &updated.issue {
            Some(TradeIssue::UnderfundedDeposit { received }) => info!(
                trade_id = %trade.id,
                received = %received,
                expected = %expected,
                "Escrow awaiting full deposit"
            ),
            Some(TradeIssue::OverfundedDeposit { received }) => warn!(
                trade_id = %trade.id,
                received = %received,
                expected = %expected,
                "Escrow overfunded, held for reconciliation"
            ),
            _ => info!(
                trade_id = %trade.id,
                old_state = %trade.status,
                new_state = %updated.status,
                escrow = %updated.escrow_status,
                "Escrow state advanced"
            ),
        }
        Ok((updated, notifications))
    }
}
