//! Shared fixtures for lifecycle unit tests

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Notify;

use super::types::{HandoffDetails, NewTradeRequest, Trade};
use super::TradeContext;
use crate::clock::ManualClock;
use crate::config::{TradeConfig, VendorConfig};
use crate::core_types::{AssetType, Direction, PaymentMethod, UserId, VendorJobId};
use crate::custodian::{Balance, Custodian, CustodianError, MockCustodian};
use crate::desk::TradeDesk;
use crate::notify::RecordingNotifier;
use crate::store::{MemoryStore, TradeStore};
use crate::vendor::VendorJob;

pub const SELLER: UserId = 1001;
pub const BUYER: UserId = 2002;
pub const VENDOR_A: UserId = 9001;
pub const VENDOR_B: UserId = 9002;
pub const BUYER_BTC_ADDRESS: &str = "bc1qbuyerreceive0001";

pub struct Harness {
    pub desk: Arc<TradeDesk>,
    pub store: Arc<MemoryStore>,
    pub custodian: Arc<MockCustodian>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        let custodian = Arc::new(MockCustodian::new());
        Self::build(custodian.clone(), custodian)
    }

    /// Harness whose release transfers park until [`GatedCustodian::open`]
    pub fn with_gated_transfers() -> (Self, Arc<GatedCustodian>) {
        let custodian = Arc::new(MockCustodian::new());
        let gate = Arc::new(GatedCustodian::new(custodian.clone()));
        (Self::build(custodian, gate.clone()), gate)
    }

    fn build(custodian: Arc<MockCustodian>, provider: Arc<dyn Custodian>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::default());

        let ctx = TradeContext::new(store.clone(), provider, notifier.clone(), clock.clone());
        let vendor_config = VendorConfig {
            vendor_ids: vec![VENDOR_A, VENDOR_B],
            ..VendorConfig::default()
        };
        let desk = Arc::new(TradeDesk::new(ctx, TradeConfig::default(), vendor_config));

        Self {
            desk,
            store,
            custodian,
            notifier,
            clock,
        }
    }

    /// 0.01 BTC for 1,500,000 at 150,000,000 per BTC, bank transfer
    pub fn sell_spec(&self) -> NewTradeRequest {
        NewTradeRequest {
            direction: Direction::Sell,
            asset_type: AssetType::Btc,
            asset_amount: Decimal::from_str("0.01").unwrap(),
            fiat_amount: Decimal::from(1_500_000),
            rate: Decimal::from(150_000_000),
            payment_method: PaymentMethod::BankTransfer,
            receiving_address: None,
            handoff: None,
            candidate_ids: vec![],
            notes: None,
        }
    }

    /// Accepted sell offer with its escrow address bound
    pub async fn open_trade(&self) -> Trade {
        let req = self.desk.registry.create(SELLER, self.sell_spec()).await.unwrap();
        self.desk
            .matching
            .accept(req.id, BUYER, Some(BUYER_BTC_ADDRESS.into()))
            .await
            .unwrap()
            .trade
    }

    /// Accepted cash pickup offer and its vendor job
    pub async fn open_cash_trade(&self) -> (Trade, VendorJob) {
        let mut spec = self.sell_spec();
        spec.payment_method = PaymentMethod::CashPickup;
        spec.handoff = Some(HandoffDetails {
            amount_usd: Decimal::from(250),
            address_payload: None,
        });
        let req = self.desk.registry.create(SELLER, spec).await.unwrap();
        let outcome = self
            .desk
            .matching
            .accept(req.id, BUYER, Some(BUYER_BTC_ADDRESS.into()))
            .await
            .unwrap();
        (outcome.trade, outcome.vendor_job.unwrap())
    }

    /// Deposit the exact amount and poll
    pub async fn fund(&self, trade: &Trade) -> Trade {
        self.custodian
            .deposit(trade.escrow_address.as_deref().unwrap(), trade.asset_amount);
        self.desk.escrow.poll_funding(trade.id).await.unwrap()
    }

    pub async fn funded_trade(&self) -> Trade {
        let trade = self.open_trade().await;
        self.fund(&trade).await
    }

    /// Funded, proof submitted and receipt confirmed; not yet released
    pub async fn confirmed_trade(&self) -> Trade {
        let trade = self.funded_trade().await;
        self.desk
            .payments
            .submit_proof(trade.id, BUYER, "proof-1".into())
            .await
            .unwrap();
        self.desk
            .payments
            .confirm_receipt(trade.id, SELLER)
            .await
            .unwrap()
    }

    pub async fn job_code(&self, job_id: VendorJobId) -> String {
        self.store
            .get_job(job_id)
            .await
            .unwrap()
            .unwrap()
            .verification_code
            .unwrap()
    }

    /// Payment submitted, confirmed by the vendor, handoff started
    pub async fn drive_job_to_in_progress(&self, job: &VendorJob) {
        let vendors = &self.desk.vendors;
        vendors
            .submit_payment(job.id, BUYER, "wire-1".into())
            .await
            .unwrap();
        vendors
            .confirm_payment(job.id, job.vendor_id, job.amount_usd, None)
            .await
            .unwrap();
        vendors.start_handoff(job.id, job.vendor_id).await.unwrap();
    }
}

/// Custodian that holds each transfer until the test lets it through
///
/// Everything else goes straight to the wrapped mock.
pub struct GatedCustodian {
    inner: Arc<MockCustodian>,
    entered: Notify,
    gate: Notify,
}

impl GatedCustodian {
    pub fn new(inner: Arc<MockCustodian>) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            gate: Notify::new(),
        }
    }

    /// Resolves once a transfer call is parked at the gate
    pub async fn transfer_parked(&self) {
        self.entered.notified().await;
    }

    /// Let one parked (or the next) transfer through
    pub fn open(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl Custodian for GatedCustodian {
    async fn create_vault(
        &self,
        asset: AssetType,
        idempotency_key: &str,
    ) -> Result<String, CustodianError> {
        self.inner.create_vault(asset, idempotency_key).await
    }

    async fn get_balance(&self, asset: AssetType, address: &str) -> Result<Balance, CustodianError> {
        self.inner.get_balance(asset, address).await
    }

    async fn transfer(
        &self,
        asset: AssetType,
        source: &str,
        destination: &str,
        amount: Decimal,
        idempotency_key: &str,
    ) -> Result<String, CustodianError> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.inner
            .transfer(asset, source, destination, amount, idempotency_key)
            .await
    }

    async fn validate_address(
        &self,
        asset: AssetType,
        address: &str,
    ) -> Result<bool, CustodianError> {
        self.inner.validate_address(asset, address).await
    }
}
