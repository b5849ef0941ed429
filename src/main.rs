//! Escrow Desk server
//!
//! ```text
//! ┌──────────┐    ┌───────────┐    ┌────────────┐
//! │ Gateway  │───▶│ TradeDesk │───▶│ TradeStore │
//! │ (axum)   │    │  (FSMs)   │    │ (pg / mem) │
//! └──────────┘    └───────────┘    └────────────┘
//!                   ▲      │
//! ┌──────────┐      │      ▼
//! │  Worker  │──────┘  ┌───────────┐   ┌──────────────┐
//! │ (sweeps) │         │ Custodian │   │ Notification │
//! └──────────┘         └───────────┘   │  dispatcher  │
//!                                      └──────────────┘
//! ```
//!
//! Usage: `escrow_desk [--env|-e <name>]` loads `config/<name>.yaml` (default `dev`).

use std::sync::Arc;

use anyhow::Context;

use escrow_desk::clock::SystemClock;
use escrow_desk::config::AppConfig;
use escrow_desk::custodian::{Custodian, HttpCustodian};
use escrow_desk::desk::TradeDesk;
use escrow_desk::gateway::{self, AppState};
use escrow_desk::notify::notification_channel;
use escrow_desk::store::{MemoryStore, PgStore, TradeStore};
use escrow_desk::trade::{TradeContext, TradeWorker, WorkerConfig};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn TradeStore>> {
    match &config.postgres_url {
        Some(url) => {
            let store = PgStore::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            store.migrate().await.context("Migration failed")?;
            tracing::info!("Trade store: PostgreSQL");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("Trade store: in-memory, state is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn build_custodian(config: &AppConfig) -> anyhow::Result<Arc<dyn Custodian>> {
    if let Some(custodian) = &config.custodian {
        tracing::info!(base_url = %custodian.base_url, "Custodian: HTTP");
        return Ok(Arc::new(HttpCustodian::new(custodian)?));
    }

    #[cfg(feature = "mock-api")]
    {
        tracing::warn!("Custodian: in-memory mock, no funds are real");
        Ok(Arc::new(escrow_desk::custodian::MockCustodian::new()))
    }

    #[cfg(not(feature = "mock-api"))]
    {
        anyhow::bail!("custodian section is required when built without mock-api")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = escrow_desk::logging::init_logging(&config);

    tracing::info!(env = %env, "Starting Escrow Desk");

    let store = build_store(&config).await?;
    let custodian = build_custodian(&config)?;

    let (notifier, dispatcher) = notification_channel(
        config.notifications.queue_size,
        config.notifications.webhook_url.clone(),
    );
    tokio::spawn(dispatcher.run());

    let ctx = TradeContext::new(store, custodian, Arc::new(notifier), Arc::new(SystemClock));
    let desk = Arc::new(TradeDesk::new(
        ctx,
        config.trade.clone(),
        config.vendor.clone(),
    ));
    if !desk.vendors.has_vendors() {
        tracing::warn!("No vendors configured; cash trades will wait for a vendor job");
    }

    let worker = TradeWorker::new(desk.clone(), WorkerConfig::from(&config.escrow));
    tokio::spawn(async move { worker.run().await });

    let state = Arc::new(AppState::new(
        desk,
        config.auth.jwt_secret.clone(),
        config.auth.callback_token.clone(),
    ));

    tokio::select! {
        res = gateway::run_server(&config.gateway.host, config.gateway.port, state) => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    }
}
