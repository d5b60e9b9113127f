//! Service configuration.

use serde::Deserialize;
use std::path::Path;

use credit_ledger_core::LedgerConfig;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/credit-ledger").
    pub data_dir: String,

    /// Service API key for service-to-service and admin auth.
    pub service_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Reservation, compensation and storage tunables.
    pub ledger: LedgerConfig,
}

/// Settings file structure.
///
/// Ledger tunables sit at the top level next to the optional API key.
#[derive(Debug, Default, Deserialize)]
struct LedgerSettings {
    #[serde(default)]
    service_api_key: Option<String>,
    #[serde(flatten)]
    ledger: LedgerConfig,
}

impl ServiceConfig {
    /// Load configuration from the settings file, then apply environment
    /// overrides.
    #[must_use]
    pub fn from_env() -> Self {
        let settings = load_settings();
        let defaults = settings.ledger;

        let ledger = LedgerConfig {
            credit_cost_per_action: env_or("CREDIT_COST_PER_ACTION", defaults.credit_cost_per_action),
            compensation_interval_secs: env_or(
                "COMPENSATION_INTERVAL_SECS",
                defaults.compensation_interval_secs,
            ),
            max_retries: env_or("COMPENSATION_MAX_RETRIES", defaults.max_retries),
            reservation_ttl_secs: env_or("RESERVATION_TTL_SECS", defaults.reservation_ttl_secs),
            storage_timeout_ms: env_or("STORAGE_TIMEOUT_MS", defaults.storage_timeout_ms),
        };

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/credit-ledger".into()),
            service_api_key: std::env::var("SERVICE_API_KEY")
                .ok()
                .or(settings.service_api_key),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_or("MAX_BODY_BYTES", 64 * 1024), // 64KB
            request_timeout_seconds: env_or("REQUEST_TIMEOUT_SECONDS", 30),
            ledger,
        }
    }
}

/// Parse an environment variable, falling back when unset or malformed.
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Load ledger settings from file, or defaults.
fn load_settings() -> LedgerSettings {
    let explicit = std::env::var("LEDGER_SETTINGS_FILE").ok();
    let secret_paths = [".secrets/ledger.json", "../.secrets/ledger.json"];

    for path in explicit.iter().map(String::as_str).chain(secret_paths) {
        match load_settings_file::<LedgerSettings>(path) {
            Ok(settings) => {
                tracing::info!(path = %path, "Loaded ledger settings from file");
                return settings;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Ignoring unreadable settings file");
            }
        }
    }

    tracing::debug!("Settings file not found, using environment variables");
    LedgerSettings::default()
}

/// Load settings from a JSON file.
fn load_settings_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Settings file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/credit-ledger".into(),
            service_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 64 * 1024,
            request_timeout_seconds: 30,
            ledger: LedgerConfig::default(),
        }
    }
}
