use std::sync::Arc;

use crate::desk::TradeDesk;
use crate::store::TradeStore;

/// Shared state for every gateway handler
#[derive(Clone)]
pub struct AppState {
    pub desk: Arc<TradeDesk>,
    /// Same store the desk writes to; used directly by the health check
    pub store: Arc<dyn TradeStore>,
    pub jwt_secret: String,
    /// Shared secret expected on custodian deposit callbacks.
    /// `None` rejects every callback.
    pub callback_token: Option<String>,
}

impl AppState {
    pub fn new(desk: Arc<TradeDesk>, jwt_secret: String, callback_token: Option<String>) -> Self {
        Self {
            store: desk.ctx.store.clone(),
            desk,
            jwt_secret,
            callback_token,
        }
    }
}
