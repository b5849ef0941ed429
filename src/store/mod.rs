//! Trade Store
//!
//! Persistence boundary for requests, trades and vendor jobs. Every state
//! change goes through a conditional update (compare-and-swap on the current
//! status), so two writers racing on the same row resolve to exactly one
//! winner without any global lock.
//!
//! - [`MemoryStore`]: DashMap-backed, per-entry atomic updates
//! - [`PgStore`]: PostgreSQL, `UPDATE ... WHERE status = $expected`

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

use crate::core_types::{TradeId, TradeRequestId, UserId, VendorJobId};
use crate::trade::state::{RequestStatus, TradeStatus};
use crate::trade::types::{Trade, TradePatch, TradeRequest};
use crate::vendor::state::JobStatus;
use crate::vendor::types::{JobPatch, VendorActivity, VendorJob};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("A trade already descends from request {0}")]
    DuplicateTrade(TradeRequestId),

    #[error("Escrow address already in use: {0}")]
    AddressInUse(String),

    #[error("A vendor job already exists for trade {0}")]
    DuplicateJob(TradeId),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    // === Trade Requests ===

    async fn insert_request(&self, req: &TradeRequest) -> Result<(), StoreError>;

    async fn get_request(&self, id: TradeRequestId) -> Result<Option<TradeRequest>, StoreError>;

    async fn list_requests(&self, status: RequestStatus) -> Result<Vec<TradeRequest>, StoreError>;

    async fn list_requests_by_requester(
        &self,
        requester_id: UserId,
    ) -> Result<Vec<TradeRequest>, StoreError>;

    /// Atomic CAS: `from → to`. With `live_at`, also requires
    /// `expires_at > live_at` in the same conditional update.
    ///
    /// Returns true if this call performed the transition.
    async fn transition_request(
        &self,
        id: TradeRequestId,
        from: RequestStatus,
        to: RequestStatus,
        live_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError>;

    /// Move every open request with `expires_at <= now` to expired.
    /// Returns only the ids this call transitioned.
    /// Accept an offer and create its trade as one atomic step: the request
    /// must be open with `expires_at > live_at`. Returns false (and writes
    /// nothing) when the request is no longer acceptable.
    async fn accept_request(
        &self,
        id: TradeRequestId,
        live_at: DateTime<Utc>,
        trade: &Trade,
    ) -> Result<bool, StoreError>;

    async fn expire_requests(&self, now: DateTime<Utc>) -> Result<Vec<TradeRequestId>, StoreError>;

    async fn record_decline(&self, id: TradeRequestId, user_id: UserId) -> Result<(), StoreError>;

    async fn declined_by(&self, user_id: UserId) -> Result<HashSet<TradeRequestId>, StoreError>;

    // === Trades ===

    /// Fails with [`StoreError::DuplicateTrade`] if the request already has a trade
    async fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError>;

    async fn get_trade(&self, id: TradeId) -> Result<Option<Trade>, StoreError>;

    async fn get_trade_by_request(
        &self,
        request_id: TradeRequestId,
    ) -> Result<Option<Trade>, StoreError>;

    async fn get_trade_by_address(&self, address: &str) -> Result<Option<Trade>, StoreError>;

    async fn list_trades(&self, statuses: &[TradeStatus]) -> Result<Vec<Trade>, StoreError>;

    /// Atomic CAS on trade status, applying `patch` in the same update.
    /// `from == to` records facts without moving the state.
    async fn transition_trade(
        &self,
        id: TradeId,
        from: TradeStatus,
        to: TradeStatus,
        patch: &TradePatch,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Bind the escrow address if the trade has none yet.
    ///
    /// Returns false if the trade already carries an address. Fails with
    /// [`StoreError::AddressInUse`] if another trade owns `address`.
    async fn bind_escrow_address(
        &self,
        id: TradeId,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    // === Vendor Jobs ===

    async fn insert_job(&self, job: &VendorJob) -> Result<(), StoreError>;

    async fn get_job(&self, id: VendorJobId) -> Result<Option<VendorJob>, StoreError>;

    async fn get_job_by_trade(&self, trade_id: TradeId) -> Result<Option<VendorJob>, StoreError>;

    async fn list_jobs_by_vendor(&self, vendor_id: UserId) -> Result<Vec<VendorJob>, StoreError>;

    /// Atomic CAS on job status, applying `patch` in the same update
    async fn transition_job(
        &self,
        id: VendorJobId,
        from: JobStatus,
        to: JobStatus,
        patch: &JobPatch,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn append_activity(&self, entry: &VendorActivity) -> Result<(), StoreError>;

    async fn list_activity(&self, job_id: VendorJobId) -> Result<Vec<VendorActivity>, StoreError>;

    /// Backend reachability check
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
