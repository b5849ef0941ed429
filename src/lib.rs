//! Escrow Desk - P2P crypto/fiat trades settled through custodial escrow
//!
//! # Modules
//!
//! - [`core_types`] - Identifiers and closed vocabularies (asset, direction, payment method)
//! - [`trade`] - Offer registry, matching, escrow, payment tracking and release
//! - [`vendor`] - Cash handoff jobs with single-use verification codes
//! - [`desk`] - Wires the lifecycle components over one shared context
//! - [`store`] - Storage trait with conditional updates (memory, PostgreSQL)
//! - [`custodian`] - Custody provider trait (HTTP client, in-memory double)
//! - [`notify`] - Fire-and-forget notification queue
//! - [`gateway`] - axum HTTP API
//! - [`config`] / [`logging`] - YAML config and tracing setup

// Core types - must be first!
pub mod core_types;

// Infrastructure
pub mod clock;
pub mod config;
pub mod locks;
pub mod logging;

// Collaborators
pub mod custodian;
pub mod notify;
pub mod store;

// Lifecycle
pub mod desk;
pub mod trade;
pub mod vendor;

// HTTP
pub mod gateway;

// Convenient re-exports at crate root
pub use core_types::{AssetType, Direction, PaymentMethod, TradeId, TradeRequestId, UserId, VendorJobId};
pub use desk::{TradeDesk, TradeView};
pub use trade::{Trade, TradeContext, TradeError, TradeRequest, TradeStatus, TradeWorker};
pub use vendor::{JobStatus, VendorJob, VendorJobDispatcher};
