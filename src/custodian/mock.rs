//! In-memory custodian for tests and local runs
//!
//! Honors idempotency keys the way a real provider does: a repeated vault or
//! transfer key returns the first result and never executes twice.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{Balance, Custodian, CustodianError};
use crate::core_types::AssetType;

/// Transfer executed by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct SentTransfer {
    pub asset: AssetType,
    pub source: String,
    pub destination: String,
    pub amount: Decimal,
    pub idempotency_key: String,
    pub tx_id: String,
}

#[derive(Default)]
pub struct MockCustodian {
    vaults: DashMap<String, String>,
    balances: DashMap<String, Balance>,
    transfers: DashMap<String, String>,
    sent: Mutex<Vec<SentTransfer>>,
    fail_transfers: AtomicBool,
    fail_vaults: AtomicBool,
    vault_calls: AtomicUsize,
}

impl MockCustodian {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a confirmed deposit
    pub fn deposit(&self, address: &str, amount: Decimal) {
        self.balances
            .entry(address.to_string())
            .or_default()
            .confirmed += amount;
    }

    /// Show an unconfirmed deposit
    pub fn deposit_pending(&self, address: &str, amount: Decimal) {
        self.balances
            .entry(address.to_string())
            .or_default()
            .pending += amount;
    }

    /// Promote all pending funds at `address` to confirmed
    pub fn confirm_pending(&self, address: &str) {
        if let Some(mut balance) = self.balances.get_mut(address) {
            let pending = std::mem::take(&mut balance.pending);
            balance.confirmed += pending;
        }
    }

    pub fn set_transfer_failure(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::SeqCst);
    }

    pub fn set_vault_failure(&self, fail: bool) {
        self.fail_vaults.store(fail, Ordering::SeqCst);
    }

    /// Transfers actually executed (deduplicated by key)
    pub fn sent_transfers(&self) -> Vec<SentTransfer> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn vault_calls(&self) -> usize {
        self.vault_calls.load(Ordering::SeqCst)
    }

    fn fresh_address(asset: AssetType) -> String {
        let raw = ulid::Ulid::new().0;
        match asset {
            AssetType::Btc => format!("bc1q{:032x}", raw),
            AssetType::Eth | AssetType::Usdt => format!("0x{:040x}", raw),
        }
    }
}

#[async_trait]
impl Custodian for MockCustodian {
    async fn create_vault(
        &self,
        asset: AssetType,
        idempotency_key: &str,
    ) -> Result<String, CustodianError> {
        self.vault_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_vaults.load(Ordering::SeqCst) {
            return Err(CustodianError::Network("vault service unavailable".into()));
        }
        let address = self
            .vaults
            .entry(idempotency_key.to_string())
            .or_insert_with(|| Self::fresh_address(asset))
            .clone();
        Ok(address)
    }

    async fn get_balance(&self, _asset: AssetType, address: &str) -> Result<Balance, CustodianError> {
        Ok(self
            .balances
            .get(address)
            .map(|b| *b)
            .unwrap_or_default())
    }

    async fn transfer(
        &self,
        asset: AssetType,
        source: &str,
        destination: &str,
        amount: Decimal,
        idempotency_key: &str,
    ) -> Result<String, CustodianError> {
        if let Some(tx_id) = self.transfers.get(idempotency_key) {
            return Ok(tx_id.clone());
        }
        if self.fail_transfers.load(Ordering::SeqCst) {
            return Err(CustodianError::Network("transfer endpoint unavailable".into()));
        }

        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        // Re-check under the log lock so two racing calls execute once
        if let Some(tx_id) = self.transfers.get(idempotency_key) {
            return Ok(tx_id.clone());
        }

        let mut balance = self.balances.entry(source.to_string()).or_default();
        if balance.confirmed < amount {
            return Err(CustodianError::Rejected {
                status: 422,
                message: format!("insufficient vault balance: {}", balance.confirmed),
            });
        }
        balance.confirmed -= amount;
        drop(balance);

        let tx_id = format!("tx-{}", ulid::Ulid::new().to_string().to_lowercase());
        self.transfers
            .insert(idempotency_key.to_string(), tx_id.clone());
        sent.push(SentTransfer {
            asset,
            source: source.to_string(),
            destination: destination.to_string(),
            amount,
            idempotency_key: idempotency_key.to_string(),
            tx_id: tx_id.clone(),
        });
        Ok(tx_id)
    }

    async fn validate_address(
        &self,
        asset: AssetType,
        address: &str,
    ) -> Result<bool, CustodianError> {
        let valid = match asset {
            AssetType::Btc => {
                (address.starts_with("bc1") && address.len() >= 14)
                    || ((address.starts_with('1') || address.starts_with('3'))
                        && (26..=35).contains(&address.len()))
            }
            AssetType::Eth | AssetType::Usdt => {
                address.starts_with("0x")
                    && address.len() == 42
                    && address[2..].chars().all(|c| c.is_ascii_hexdigit())
            }
        };
        Ok(valid)
    }
}
