//! In-memory Trade Store
//!
//! DashMap shards give per-entry write locks, so each CAS below checks and
//! mutates a row while holding that row's shard guard. Secondary indexes
//! enforce the one-trade-per-request and one-address-per-trade constraints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;

use super::{StoreError, TradeStore};
use crate::core_types::{TradeId, TradeRequestId, UserId, VendorJobId};
use crate::trade::state::{RequestStatus, TradeStatus};
use crate::trade::types::{Trade, TradePatch, TradeRequest};
use crate::vendor::state::JobStatus;
use crate::vendor::types::{JobPatch, VendorActivity, VendorJob};

#[derive(Default)]
pub struct MemoryStore {
    requests: DashMap<TradeRequestId, TradeRequest>,
    declines: DashMap<UserId, HashSet<TradeRequestId>>,
    trades: DashMap<TradeId, Trade>,
    trade_by_request: DashMap<TradeRequestId, TradeId>,
    trade_by_address: DashMap<String, TradeId>,
    jobs: DashMap<VendorJobId, VendorJob>,
    job_by_trade: DashMap<TradeId, VendorJobId>,
    activity: DashMap<VendorJobId, Vec<VendorActivity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn insert_request(&self, req: &TradeRequest) -> Result<(), StoreError> {
        self.requests.insert(req.id, req.clone());
        Ok(())
    }

    async fn get_request(&self, id: TradeRequestId) -> Result<Option<TradeRequest>, StoreError> {
        Ok(self.requests.get(&id).map(|r| r.clone()))
    }

    async fn list_requests(&self, status: RequestStatus) -> Result<Vec<TradeRequest>, StoreError> {
        let mut out: Vec<TradeRequest> = self
            .requests
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.clone())
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn list_requests_by_requester(
        &self,
        requester_id: UserId,
    ) -> Result<Vec<TradeRequest>, StoreError> {
        let mut out: Vec<TradeRequest> = self
            .requests
            .iter()
            .filter(|r| r.requester_id == requester_id)
            .map(|r| r.clone())
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn transition_request(
        &self,
        id: TradeRequestId,
        from: RequestStatus,
        to: RequestStatus,
        live_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let Some(mut req) = self.requests.get_mut(&id) else {
            return Ok(false);
        };
        if req.status != from {
            return Ok(false);
        }
        if let Some(at) = live_at
            && at >= req.expires_at
        {
            return Ok(false);
        }
        req.status = to;
        Ok(true)
    }

    async fn accept_request(
        &self,
        id: TradeRequestId,
        live_at: DateTime<Utc>,
        trade: &Trade,
    ) -> Result<bool, StoreError> {
        let Some(mut req) = self.requests.get_mut(&id) else {
            return Ok(false);
        };
        if req.status != RequestStatus::Open || live_at >= req.expires_at {
            return Ok(false);
        }
        match self.trade_by_request.entry(id) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateTrade(id)),
            Entry::Vacant(slot) => {
                self.trades.insert(trade.id, trade.clone());
                slot.insert(trade.id);
            }
        }
        req.status = RequestStatus::Accepted;
        Ok(true)
    }

    async fn expire_requests(&self, now: DateTime<Utc>) -> Result<Vec<TradeRequestId>, StoreError> {
        let mut expired = Vec::new();
        for mut req in self.requests.iter_mut() {
            if req.status == RequestStatus::Open && req.expires_at <= now {
                req.status = RequestStatus::Expired;
                expired.push(req.id);
            }
        }
        Ok(expired)
    }

    async fn record_decline(&self, id: TradeRequestId, user_id: UserId) -> Result<(), StoreError> {
        self.declines.entry(user_id).or_default().insert(id);
        Ok(())
    }

    async fn declined_by(&self, user_id: UserId) -> Result<HashSet<TradeRequestId>, StoreError> {
        Ok(self
            .declines
            .get(&user_id)
            .map(|s| s.clone())
            .unwrap_or_default())
    }

    async fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        match self.trade_by_request.entry(trade.trade_request_id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateTrade(trade.trade_request_id)),
            Entry::Vacant(slot) => {
                self.trades.insert(trade.id, trade.clone());
                slot.insert(trade.id);
                Ok(())
            }
        }
    }

    async fn get_trade(&self, id: TradeId) -> Result<Option<Trade>, StoreError> {
        Ok(self.trades.get(&id).map(|t| t.clone()))
    }

    async fn get_trade_by_request(
        &self,
        request_id: TradeRequestId,
    ) -> Result<Option<Trade>, StoreError> {
        let Some(id) = self.trade_by_request.get(&request_id).map(|id| *id) else {
            return Ok(None);
        };
        self.get_trade(id).await
    }

    async fn get_trade_by_address(&self, address: &str) -> Result<Option<Trade>, StoreError> {
        let Some(id) = self.trade_by_address.get(address).map(|id| *id) else {
            return Ok(None);
        };
        self.get_trade(id).await
    }

    async fn list_trades(&self, statuses: &[TradeStatus]) -> Result<Vec<Trade>, StoreError> {
        let mut out: Vec<Trade> = self
            .trades
            .iter()
            .filter(|t| statuses.contains(&t.status))
            .map(|t| t.clone())
            .collect();
        out.sort_by_key(|t| t.created_at);
        Ok(out)
    }

    async fn transition_trade(
        &self,
        id: TradeId,
        from: TradeStatus,
        to: TradeStatus,
        patch: &TradePatch,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(mut trade) = self.trades.get_mut(&id) else {
            return Ok(false);
        };
        if trade.status != from {
            return Ok(false);
        }
        trade.apply(to, patch, now);
        Ok(true)
    }

    async fn bind_escrow_address(
        &self,
        id: TradeId,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(mut trade) = self.trades.get_mut(&id) else {
            return Ok(false);
        };
        if trade.escrow_address.is_some() {
            return Ok(false);
        }
        match self.trade_by_address.entry(address.to_string()) {
            Entry::Occupied(owner) if *owner.get() != id => {
                Err(StoreError::AddressInUse(address.to_string()))
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(id);
                trade.escrow_address = Some(address.to_string());
                trade.updated_at = now;
                Ok(true)
            }
        }
    }

    async fn insert_job(&self, job: &VendorJob) -> Result<(), StoreError> {
        match self.job_by_trade.entry(job.trade_id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateJob(job.trade_id)),
            Entry::Vacant(slot) => {
                self.jobs.insert(job.id, job.clone());
                slot.insert(job.id);
                Ok(())
            }
        }
    }

    async fn get_job(&self, id: VendorJobId) -> Result<Option<VendorJob>, StoreError> {
        Ok(self.jobs.get(&id).map(|j| j.clone()))
    }

    async fn get_job_by_trade(&self, trade_id: TradeId) -> Result<Option<VendorJob>, StoreError> {
        let Some(id) = self.job_by_trade.get(&trade_id).map(|id| *id) else {
            return Ok(None);
        };
        self.get_job(id).await
    }

    async fn list_jobs_by_vendor(&self, vendor_id: UserId) -> Result<Vec<VendorJob>, StoreError> {
        let mut out: Vec<VendorJob> = self
            .jobs
            .iter()
            .filter(|j| j.vendor_id == vendor_id)
            .map(|j| j.clone())
            .collect();
        out.sort_by_key(|j| j.created_at);
        Ok(out)
    }

    async fn transition_job(
        &self,
        id: VendorJobId,
        from: JobStatus,
        to: JobStatus,
        patch: &JobPatch,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(mut job) = self.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status != from {
            return Ok(false);
        }
        job.apply(to, patch, now);
        Ok(true)
    }

    async fn append_activity(&self, entry: &VendorActivity) -> Result<(), StoreError> {
        self.activity
            .entry(entry.job_id)
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn list_activity(&self, job_id: VendorJobId) -> Result<Vec<VendorActivity>, StoreError> {
        Ok(self
            .activity
            .get(&job_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }
}
