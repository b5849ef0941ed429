//! End-to-end lifecycle through the public API
//!
//! Runs with the default `mock-api` feature: in-memory store, custodian,
//! notifier and a manual clock.

use std::str::FromStr;
use std::sync::Arc;

use futures::future::join_all;
use rust_decimal::Decimal;

use escrow_desk::clock::ManualClock;
use escrow_desk::config::{TradeConfig, VendorConfig};
use escrow_desk::core_types::{AssetType, Direction, PaymentMethod, UserId};
use escrow_desk::custodian::MockCustodian;
use escrow_desk::desk::TradeDesk;
use escrow_desk::notify::{NotificationKind, RecordingNotifier, Recipient};
use escrow_desk::store::{MemoryStore, TradeStore};
use escrow_desk::trade::{
    HandoffDetails, NewTradeRequest, Trade, TradeContext, TradeError, TradeStatus,
};
use escrow_desk::vendor::{JobStatus, VendorJob};

const SELLER: UserId = 11;
const BUYER: UserId = 22;
const VENDOR: UserId = 900;
const BUYER_ADDRESS: &str = "bc1qlifecyclebuyer";

struct Desk {
    desk: Arc<TradeDesk>,
    store: Arc<MemoryStore>,
    custodian: Arc<MockCustodian>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<ManualClock>,
}

impl Desk {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let custodian = Arc::new(MockCustodian::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::default());
        let ctx = TradeContext::new(
            store.clone(),
            custodian.clone(),
            notifier.clone(),
            clock.clone(),
        );
        let vendor_config = VendorConfig {
            vendor_ids: vec![VENDOR],
            ..VendorConfig::default()
        };
        Self {
            desk: Arc::new(TradeDesk::new(ctx, TradeConfig::default(), vendor_config)),
            store,
            custodian,
            notifier,
            clock,
        }
    }

    fn offer(&self, payment_method: PaymentMethod) -> NewTradeRequest {
        let handoff = (payment_method != PaymentMethod::BankTransfer).then(|| HandoffDetails {
            amount_usd: Decimal::from(300),
            address_payload: (payment_method == PaymentMethod::CashDelivery)
                .then(|| serde_json::json!({ "street": "12 Harbour Rd", "city": "Lagos" })),
        });
        NewTradeRequest {
            direction: Direction::Sell,
            asset_type: AssetType::Btc,
            asset_amount: Decimal::from_str("0.02").unwrap(),
            fiat_amount: Decimal::from(3_000),
            rate: Decimal::from(150_000),
            payment_method,
            receiving_address: None,
            handoff,
            candidate_ids: vec![],
            notes: None,
        }
    }

    async fn open(&self, payment_method: PaymentMethod) -> (Trade, Option<VendorJob>) {
        let req = self
            .desk
            .registry
            .create(SELLER, self.offer(payment_method))
            .await
            .unwrap();
        let outcome = self
            .desk
            .matching
            .accept(req.id, BUYER, Some(BUYER_ADDRESS.into()))
            .await
            .unwrap();
        (outcome.trade, outcome.vendor_job)
    }

    async fn fund_and_prove(&self, trade: &Trade) {
        let address = trade.escrow_address.as_deref().unwrap();
        self.custodian.deposit(address, trade.asset_amount);
        self.desk.escrow.on_deposit_callback(address).await.unwrap();
        self.desk
            .payments
            .submit_proof(trade.id, BUYER, "receipt-77".into())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn bank_transfer_trade_settles_once() {
    let d = Desk::new();
    let (trade, job) = d.open(PaymentMethod::BankTransfer).await;
    assert!(job.is_none());
    d.fund_and_prove(&trade).await;

    let confirmed = d
        .desk
        .payments
        .confirm_receipt(trade.id, SELLER)
        .await
        .unwrap();
    assert_eq!(confirmed.status, TradeStatus::PaymentConfirmed);

    // Racing releases: one transfer, the rest rejected
    let attempts = join_all((0..6).map(|_| d.desk.release.release(trade.id))).await;
    assert_eq!(attempts.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(d.custodian.sent_transfers().len(), 1);

    let again = d.desk.release.release(trade.id).await.unwrap_err();
    assert!(matches!(again, TradeError::InvalidState { .. }));
    assert_eq!(d.custodian.sent_transfers().len(), 1);

    let view = d.desk.trade_state(trade.id, BUYER).await.unwrap();
    assert_eq!(view.trade.status, TradeStatus::Completed);
    assert_eq!(view.trade.payment_proof_ref.as_deref(), Some("receipt-77"));
    assert_eq!(
        d.notifier
            .count_for(Recipient::User(BUYER), NotificationKind::TradeCompleted),
        1
    );
}

#[tokio::test]
async fn expired_offer_cannot_be_accepted() {
    let d = Desk::new();
    let req = d
        .desk
        .registry
        .create(SELLER, d.offer(PaymentMethod::BankTransfer))
        .await
        .unwrap();

    d.clock.advance_minutes(11);
    let err = d
        .desk
        .matching
        .accept(req.id, BUYER, Some(BUYER_ADDRESS.into()))
        .await
        .unwrap_err();
    assert_eq!(err, TradeError::Expired);
    assert_eq!(d.custodian.vault_calls(), 0);
}

#[tokio::test]
async fn second_proof_keeps_the_first() {
    let d = Desk::new();
    let (trade, _) = d.open(PaymentMethod::BankTransfer).await;
    d.fund_and_prove(&trade).await;

    let err = d
        .desk
        .payments
        .submit_proof(trade.id, BUYER, "receipt-78".into())
        .await
        .unwrap_err();
    assert_eq!(err, TradeError::DuplicateProofSubmission);

    let view = d.desk.trade_state(trade.id, SELLER).await.unwrap();
    assert_eq!(view.trade.payment_proof_ref.as_deref(), Some("receipt-77"));
}

#[tokio::test]
async fn cash_delivery_code_is_single_use() {
    let d = Desk::new();
    let (trade, job) = d.open(PaymentMethod::CashDelivery).await;
    let job = job.unwrap();
    assert_eq!(job.vendor_id, VENDOR);

    // Only the customer (seller) ever sees the code
    let code = d
        .desk
        .vendors
        .get(job.id, SELLER)
        .await
        .unwrap()
        .verification_code
        .unwrap();
    assert!(
        d.desk
            .vendors
            .get(job.id, VENDOR)
            .await
            .unwrap()
            .verification_code
            .is_none()
    );

    d.fund_and_prove(&trade).await;
    d.desk
        .vendors
        .submit_payment(job.id, BUYER, "wire-300".into())
        .await
        .unwrap();
    d.desk
        .vendors
        .confirm_payment(job.id, VENDOR, Decimal::from(300), Some("BR-1".into()))
        .await
        .unwrap();
    d.desk.vendors.start_handoff(job.id, VENDOR).await.unwrap();

    let done = d
        .desk
        .vendors
        .complete_with_code(job.id, VENDOR, &code)
        .await
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let reuse = d
        .desk
        .vendors
        .complete_with_code(job.id, VENDOR, &code)
        .await
        .unwrap_err();
    assert!(matches!(reuse, TradeError::InvalidJobState { .. }));

    // Handoff done: seller confirmation releases immediately
    let trade = d.desk.confirm_receipt(trade.id, SELLER).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Completed);

    let actions: Vec<String> = d
        .desk
        .vendors
        .activity(job.id)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.action)
        .collect();
    assert_eq!(
        actions,
        [
            "job_created",
            "payment_submitted",
            "payment_confirmed",
            "handoff_started",
            "handoff_completed"
        ]
    );
    let stored = d.store.get_job_by_trade(trade.id).await.unwrap().unwrap();
    assert!(stored.verification_code.is_none());
}
