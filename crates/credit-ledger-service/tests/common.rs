//! Common test utilities for credit-ledger integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use tempfile::TempDir;

use credit_ledger_core::{LedgerConfig, UserId};
use credit_ledger_service::{create_router, AppState, Ledger, ServiceConfig};
use credit_ledger_store::Store;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Ledger sharing the server's store.
    pub ledger: Ledger,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
}

/// Open a fresh store in `dir`.
pub fn open_store(dir: &TempDir) -> Arc<dyn Store> {
    #[cfg(feature = "rocksdb-backend")]
    {
        Arc::new(credit_ledger_store::RocksStore::open(dir.path()).expect("Failed to open store"))
    }
    #[cfg(not(feature = "rocksdb-backend"))]
    {
        let _ = dir;
        Arc::new(credit_ledger_store::MemoryStore::new())
    }
}

/// A ledger over a fresh store; keep the returned directory alive.
pub fn test_ledger(config: LedgerConfig) -> (Ledger, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let ledger = Ledger::new(open_store(&temp_dir), config);
    (ledger, temp_dir)
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = open_store(&temp_dir);

        let service_api_key = "test-service-key".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            service_api_key: Some(service_api_key.clone()),
            cors_origins: vec!["*".into()],
            max_body_bytes: 64 * 1024,
            request_timeout_seconds: 30,
            ledger: LedgerConfig::default(),
        };

        let state = AppState::new(store, config);
        let ledger = state.ledger.clone();
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");
        let test_user_id = UserId::generate();

        Self {
            server,
            ledger,
            _temp_dir: temp_dir,
            test_user_id,
            service_api_key,
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> String {
        format!("Bearer test-token:{}", self.test_user_id)
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        let other_user = UserId::generate();
        format!("Bearer test-token:{other_user}")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
