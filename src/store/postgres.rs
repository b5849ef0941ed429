//! PostgreSQL Trade Store
//!
//! All status changes are single `UPDATE ... WHERE id = $id AND status = $expected`
//! statements; `rows_affected() == 1` means this caller won the transition.
//! Uniqueness (one trade per request, one address per trade, one job per
//! trade) is enforced by table constraints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::HashSet;
use std::time::Duration;

use super::{StoreError, TradeStore};
use crate::core_types::{TradeId, TradeRequestId, UserId, VendorJobId};
use crate::trade::state::{EscrowStatus, RequestStatus, TradeStatus};
use crate::trade::types::{HandoffDetails, Trade, TradeIssue, TradePatch, TradeRequest};
use crate::vendor::state::JobStatus;
use crate::vendor::types::{JobPatch, VendorActivity, VendorJob};

const SCHEMA: &str = include_str!("../../migrations/0001_trade_lifecycle.sql");

const REQUEST_COLUMNS: &str = "id, requester_id, direction, asset_type, asset_amount, \
     fiat_amount, rate, payment_method, status, receiving_address, handoff, candidate_ids, \
     notes, created_at, expires_at";

const TRADE_COLUMNS: &str = "id, trade_request_id, seller_id, buyer_id, asset_type, \
     asset_amount, fiat_amount, rate, payment_method, status, escrow_address, escrow_status, \
     receiving_address, payment_proof_ref, issue, release_tx_id, created_at, funded_at, \
     payment_submitted_at, payment_confirmed_at, completed_at, updated_at";

const JOB_COLUMNS: &str = "id, trade_id, vendor_id, payer_id, customer_id, amount_usd, \
     delivery_type, status, verification_code, code_attempts, locked, address_payload, \
     payer_reference, amount_received, bank_reference, created_at, payment_confirmed_at, \
     completed_at, updated_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the schema exists
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        tracing::info!("PostgreSQL trade store ready");
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("invalid {}: {}", what, raw)))
}

fn parse_enum<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T, StoreError> {
    raw.parse().map_err(StoreError::Corrupt)
}

async fn insert_trade_row<'e, E>(executor: E, trade: &Trade) -> Result<(), sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    let issue = trade
        .issue
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        r#"
        INSERT INTO trades_tb
            (id, trade_request_id, seller_id, buyer_id, asset_type, asset_amount,
             fiat_amount, rate, payment_method, status, escrow_address, escrow_status,
             receiving_address, payment_proof_ref, issue, release_tx_id, created_at,
             updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18)
        "#,
    )
    .bind(trade.id.to_string())
    .bind(trade.trade_request_id.to_string())
    .bind(trade.seller_id as i64)
    .bind(trade.buyer_id as i64)
    .bind(trade.asset_type.as_str())
    .bind(trade.asset_amount)
    .bind(trade.fiat_amount)
    .bind(trade.rate)
    .bind(trade.payment_method.as_str())
    .bind(trade.status.id())
    .bind(&trade.escrow_address)
    .bind(trade.escrow_status.id())
    .bind(&trade.receiving_address)
    .bind(&trade.payment_proof_ref)
    .bind(issue)
    .bind(&trade.release_tx_id)
    .bind(trade.created_at)
    .bind(trade.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

fn row_to_request(row: &PgRow) -> Result<TradeRequest, StoreError> {
    let id: String = row.try_get("id")?;
    let status_id: i16 = row.try_get("status")?;
    let status = RequestStatus::from_id(status_id)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid request status: {}", status_id)))?;

    let handoff: Option<serde_json::Value> = row.try_get("handoff")?;
    let handoff: Option<HandoffDetails> = handoff.map(serde_json::from_value).transpose()?;
    let candidates: serde_json::Value = row.try_get("candidate_ids")?;

    Ok(TradeRequest {
        id: parse_id(&id, "request id")?,
        requester_id: row.try_get::<i64, _>("requester_id")? as UserId,
        direction: parse_enum(row.try_get::<&str, _>("direction")?)?,
        asset_type: parse_enum(row.try_get::<&str, _>("asset_type")?)?,
        asset_amount: row.try_get("asset_amount")?,
        fiat_amount: row.try_get("fiat_amount")?,
        rate: row.try_get("rate")?,
        payment_method: parse_enum(row.try_get::<&str, _>("payment_method")?)?,
        status,
        receiving_address: row.try_get("receiving_address")?,
        handoff,
        candidate_ids: serde_json::from_value(candidates)?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn row_to_trade(row: &PgRow) -> Result<Trade, StoreError> {
    let id: String = row.try_get("id")?;
    let request_id: String = row.try_get("trade_request_id")?;
    let status_id: i16 = row.try_get("status")?;
    let status = TradeStatus::from_id(status_id)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid trade status: {}", status_id)))?;
    let escrow_id: i16 = row.try_get("escrow_status")?;
    let escrow_status = EscrowStatus::from_id(escrow_id)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid escrow status: {}", escrow_id)))?;
    let issue: Option<serde_json::Value> = row.try_get("issue")?;
    let issue: Option<TradeIssue> = issue.map(serde_json::from_value).transpose()?;

    Ok(Trade {
        id: parse_id(&id, "trade id")?,
        trade_request_id: parse_id(&request_id, "request id")?,
        seller_id: row.try_get::<i64, _>("seller_id")? as UserId,
        buyer_id: row.try_get::<i64, _>("buyer_id")? as UserId,
        asset_type: parse_enum(row.try_get::<&str, _>("asset_type")?)?,
        asset_amount: row.try_get("asset_amount")?,
        fiat_amount: row.try_get("fiat_amount")?,
        rate: row.try_get("rate")?,
        payment_method: parse_enum(row.try_get::<&str, _>("payment_method")?)?,
        status,
        escrow_address: row.try_get("escrow_address")?,
        escrow_status,
        receiving_address: row.try_get("receiving_address")?,
        payment_proof_ref: row.try_get("payment_proof_ref")?,
        issue,
        release_tx_id: row.try_get("release_tx_id")?,
        created_at: row.try_get("created_at")?,
        funded_at: row.try_get("funded_at")?,
        payment_submitted_at: row.try_get("payment_submitted_at")?,
        payment_confirmed_at: row.try_get("payment_confirmed_at")?,
        completed_at: row.try_get("completed_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_job(row: &PgRow) -> Result<VendorJob, StoreError> {
    let id: String = row.try_get("id")?;
    let trade_id: String = row.try_get("trade_id")?;
    let status_id: i16 = row.try_get("status")?;
    let status = JobStatus::from_id(status_id)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid job status: {}", status_id)))?;

    Ok(VendorJob {
        id: parse_id(&id, "job id")?,
        trade_id: parse_id(&trade_id, "trade id")?,
        vendor_id: row.try_get::<i64, _>("vendor_id")? as UserId,
        payer_id: row.try_get::<i64, _>("payer_id")? as UserId,
        customer_id: row.try_get::<i64, _>("customer_id")? as UserId,
        amount_usd: row.try_get("amount_usd")?,
        delivery_type: parse_enum(row.try_get::<&str, _>("delivery_type")?)?,
        status,
        verification_code: row.try_get("verification_code")?,
        code_attempts: row.try_get::<i32, _>("code_attempts")? as u32,
        locked: row.try_get("locked")?,
        address_payload: row.try_get("address_payload")?,
        payer_reference: row.try_get("payer_reference")?,
        amount_received: row.try_get::<Option<Decimal>, _>("amount_received")?,
        bank_reference: row.try_get("bank_reference")?,
        created_at: row.try_get("created_at")?,
        payment_confirmed_at: row.try_get("payment_confirmed_at")?,
        completed_at: row.try_get("completed_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl TradeStore for PgStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_request(&self, req: &TradeRequest) -> Result<(), StoreError> {
        let handoff = req.handoff.as_ref().map(serde_json::to_value).transpose()?;
        let candidates = serde_json::to_value(&req.candidate_ids)?;

        sqlx::query(
            r#"
            INSERT INTO trade_requests_tb
                (id, requester_id, direction, asset_type, asset_amount, fiat_amount, rate,
                 payment_method, status, receiving_address, handoff, candidate_ids, notes,
                 created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(req.id.to_string())
        .bind(req.requester_id as i64)
        .bind(req.direction.as_str())
        .bind(req.asset_type.as_str())
        .bind(req.asset_amount)
        .bind(req.fiat_amount)
        .bind(req.rate)
        .bind(req.payment_method.as_str())
        .bind(req.status.id())
        .bind(&req.receiving_address)
        .bind(handoff)
        .bind(candidates)
        .bind(&req.notes)
        .bind(req.created_at)
        .bind(req.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_request(&self, id: TradeRequestId) -> Result<Option<TradeRequest>, StoreError> {
        let sql = format!("SELECT {} FROM trade_requests_tb WHERE id = $1", REQUEST_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_request).transpose()
    }

    async fn list_requests(&self, status: RequestStatus) -> Result<Vec<TradeRequest>, StoreError> {
        let sql = format!(
            "SELECT {} FROM trade_requests_tb WHERE status = $1 ORDER BY created_at ASC",
            REQUEST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(status.id())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_request).collect()
    }

    async fn list_requests_by_requester(
        &self,
        requester_id: UserId,
    ) -> Result<Vec<TradeRequest>, StoreError> {
        let sql = format!(
            "SELECT {} FROM trade_requests_tb WHERE requester_id = $1 ORDER BY created_at ASC",
            REQUEST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(requester_id as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_request).collect()
    }

    async fn transition_request(
        &self,
        id: TradeRequestId,
        from: RequestStatus,
        to: RequestStatus,
        live_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE trade_requests_tb
            SET status = $1
            WHERE id = $2 AND status = $3
              AND ($4::timestamptz IS NULL OR expires_at > $4)
            "#,
        )
        .bind(to.id())
        .bind(id.to_string())
        .bind(from.id())
        .bind(live_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn accept_request(
        &self,
        id: TradeRequestId,
        live_at: DateTime<Utc>,
        trade: &Trade,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE trade_requests_tb
            SET status = $1
            WHERE id = $2 AND status = $3 AND expires_at > $4
            "#,
        )
        .bind(RequestStatus::Accepted.id())
        .bind(id.to_string())
        .bind(RequestStatus::Open.id())
        .bind(live_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        match insert_trade_row(&mut *tx, trade).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => return Err(StoreError::DuplicateTrade(id)),
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn expire_requests(&self, now: DateTime<Utc>) -> Result<Vec<TradeRequestId>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE trade_requests_tb
            SET status = $1
            WHERE status = $2 AND expires_at <= $3
            RETURNING id
            "#,
        )
        .bind(RequestStatus::Expired.id())
        .bind(RequestStatus::Open.id())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        ids.iter().map(|id| parse_id(id, "request id")).collect()
    }

    async fn record_decline(&self, id: TradeRequestId, user_id: UserId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO trade_request_declines_tb (request_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(id.to_string())
        .bind(user_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn declined_by(&self, user_id: UserId) -> Result<HashSet<TradeRequestId>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT request_id FROM trade_request_declines_tb WHERE user_id = $1",
        )
        .bind(user_id as i64)
        .fetch_all(&self.pool)
        .await?;

        ids.iter().map(|id| parse_id(id, "request id")).collect()
    }

    async fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        match insert_trade_row(&self.pool, trade).await {
            Ok(()) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(StoreError::DuplicateTrade(trade.trade_request_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_trade(&self, id: TradeId) -> Result<Option<Trade>, StoreError> {
        let sql = format!("SELECT {} FROM trades_tb WHERE id = $1", TRADE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_trade).transpose()
    }

    async fn get_trade_by_request(
        &self,
        request_id: TradeRequestId,
    ) -> Result<Option<Trade>, StoreError> {
        let sql = format!(
            "SELECT {} FROM trades_tb WHERE trade_request_id = $1",
            TRADE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(request_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_trade).transpose()
    }

    async fn get_trade_by_address(&self, address: &str) -> Result<Option<Trade>, StoreError> {
        let sql = format!("SELECT {} FROM trades_tb WHERE escrow_address = $1", TRADE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_trade).transpose()
    }

    async fn list_trades(&self, statuses: &[TradeStatus]) -> Result<Vec<Trade>, StoreError> {
        let ids: Vec<i16> = statuses.iter().map(|s| s.id()).collect();
        let sql = format!(
            "SELECT {} FROM trades_tb WHERE status = ANY($1) ORDER BY created_at ASC",
            TRADE_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(ids).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_trade).collect()
    }

    async fn transition_trade(
        &self,
        id: TradeId,
        from: TradeStatus,
        to: TradeStatus,
        patch: &TradePatch,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let (set_issue, issue) = match &patch.issue {
            Some(issue) => (true, issue.as_ref().map(serde_json::to_value).transpose()?),
            None => (false, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE trades_tb SET
                status = $1,
                escrow_status = COALESCE($2, escrow_status),
                payment_proof_ref = COALESCE($3, payment_proof_ref),
                issue = CASE WHEN $4 THEN $5 ELSE issue END,
                release_tx_id = COALESCE($6, release_tx_id),
                funded_at = COALESCE($7, funded_at),
                payment_submitted_at = COALESCE($8, payment_submitted_at),
                payment_confirmed_at = COALESCE($9, payment_confirmed_at),
                completed_at = COALESCE($10, completed_at),
                updated_at = $11
            WHERE id = $12 AND status = $13
            "#,
        )
        .bind(to.id())
        .bind(patch.escrow_status.map(|s| s.id()))
        .bind(&patch.payment_proof_ref)
        .bind(set_issue)
        .bind(issue)
        .bind(&patch.release_tx_id)
        .bind(patch.funded_at)
        .bind(patch.payment_submitted_at)
        .bind(patch.payment_confirmed_at)
        .bind(patch.completed_at)
        .bind(now)
        .bind(id.to_string())
        .bind(from.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn bind_escrow_address(
        &self,
        id: TradeId,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE trades_tb
            SET escrow_address = $1, updated_at = $2
            WHERE id = $3 AND escrow_address IS NULL
            "#,
        )
        .bind(address)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await;

        match result {
            Ok(r) => Ok(r.rows_affected() > 0),
            Err(e) if is_unique_violation(&e) => Err(StoreError::AddressInUse(address.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_job(&self, job: &VendorJob) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO vendor_jobs_tb
                (id, trade_id, vendor_id, payer_id, customer_id, amount_usd, delivery_type,
                 status, verification_code, code_attempts, locked, address_payload,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.trade_id.to_string())
        .bind(job.vendor_id as i64)
        .bind(job.payer_id as i64)
        .bind(job.customer_id as i64)
        .bind(job.amount_usd)
        .bind(job.delivery_type.as_str())
        .bind(job.status.id())
        .bind(&job.verification_code)
        .bind(job.code_attempts as i32)
        .bind(job.locked)
        .bind(&job.address_payload)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateJob(job.trade_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_job(&self, id: VendorJobId) -> Result<Option<VendorJob>, StoreError> {
        let sql = format!("SELECT {} FROM vendor_jobs_tb WHERE id = $1", JOB_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn get_job_by_trade(&self, trade_id: TradeId) -> Result<Option<VendorJob>, StoreError> {
        let sql = format!("SELECT {} FROM vendor_jobs_tb WHERE trade_id = $1", JOB_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(trade_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn list_jobs_by_vendor(&self, vendor_id: UserId) -> Result<Vec<VendorJob>, StoreError> {
        let sql = format!(
            "SELECT {} FROM vendor_jobs_tb WHERE vendor_id = $1 ORDER BY created_at ASC",
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(vendor_id as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    async fn transition_job(
        &self,
        id: VendorJobId,
        from: JobStatus,
        to: JobStatus,
        patch: &JobPatch,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE vendor_jobs_tb SET
                status = $1,
                payer_reference = COALESCE($2, payer_reference),
                amount_received = COALESCE($3, amount_received),
                bank_reference = COALESCE($4, bank_reference),
                code_attempts = COALESCE($5, code_attempts),
                locked = COALESCE($6, locked),
                verification_code = CASE WHEN $7 THEN NULL ELSE verification_code END,
                payment_confirmed_at = COALESCE($8, payment_confirmed_at),
                completed_at = COALESCE($9, completed_at),
                updated_at = $10
            WHERE id = $11 AND status = $12
            "#,
        )
        .bind(to.id())
        .bind(&patch.payer_reference)
        .bind(patch.amount_received)
        .bind(&patch.bank_reference)
        .bind(patch.code_attempts.map(|a| a as i32))
        .bind(patch.locked)
        .bind(patch.consume_code)
        .bind(patch.payment_confirmed_at)
        .bind(patch.completed_at)
        .bind(now)
        .bind(id.to_string())
        .bind(from.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_activity(&self, entry: &VendorActivity) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO vendor_activity_tb (job_id, actor_id, action, meta, at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.job_id.to_string())
        .bind(entry.actor_id as i64)
        .bind(&entry.action)
        .bind(&entry.meta)
        .bind(entry.at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_activity(&self, job_id: VendorJobId) -> Result<Vec<VendorActivity>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, actor_id, action, meta, at
            FROM vendor_activity_tb
            WHERE job_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(job_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let job_id: String = row.try_get("job_id")?;
                Ok(VendorActivity {
                    job_id: parse_id(&job_id, "job id")?,
                    actor_id: row.try_get::<i64, _>("actor_id")? as UserId,
                    action: row.try_get("action")?,
                    meta: row.try_get("meta")?,
                    at: row.try_get("at")?,
                })
            })
            .collect()
    }
}
