//! Application state.

use std::sync::Arc;

use credit_ledger_store::Store;

use crate::config::ServiceConfig;
use crate::ledger::Ledger;

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The ledger facade.
    pub ledger: Ledger,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state over a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not configured - grant and admin routes are closed");
        }

        let ledger = Ledger::new(store, config.ledger.clone());
        Self { ledger, config }
    }
}
