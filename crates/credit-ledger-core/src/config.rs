//! Ledger settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default credits charged per billable action.
pub const DEFAULT_CREDIT_COST_PER_ACTION: i64 = 1;

/// Default compensation tick interval in seconds.
pub const DEFAULT_COMPENSATION_INTERVAL_SECS: u64 = 5;

/// Default retry budget of a compensation task.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default lifetime of an unconfirmed reservation in seconds.
pub const DEFAULT_RESERVATION_TTL_SECS: u64 = 600;

/// Upper bound applied to configured reservation lifetimes.
const MAX_RESERVATION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Default bound on a single storage call in milliseconds.
pub const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 5_000;

/// Largest page the transaction history query will return.
pub const MAX_PAGE_LIMIT: usize = 100;

/// Page size used when the caller does not specify one.
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Tunables for the reservation protocol and compensation loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Credits charged per billable action.
    pub credit_cost_per_action: i64,

    /// Seconds between compensation ticks.
    pub compensation_interval_secs: u64,

    /// Retry budget assigned to new compensation tasks.
    pub max_retries: u32,

    /// Seconds before an unconfirmed reservation may be reclaimed.
    pub reservation_ttl_secs: u64,

    /// Milliseconds a single storage call may take.
    pub storage_timeout_ms: u64,
}

impl LedgerConfig {
    /// Compensation tick interval.
    #[must_use]
    pub const fn compensation_interval(&self) -> Duration {
        Duration::from_secs(self.compensation_interval_secs)
    }

    /// Reservation lifetime.
    #[must_use]
    pub fn reservation_ttl(&self) -> chrono::Duration {
        // Capped so chrono never overflows.
        let secs = i64::try_from(self.reservation_ttl_secs)
            .unwrap_or(i64::MAX)
            .min(MAX_RESERVATION_TTL_SECS);
        chrono::Duration::seconds(secs)
    }

    /// Storage call timeout.
    #[must_use]
    pub const fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            credit_cost_per_action: DEFAULT_CREDIT_COST_PER_ACTION,
            compensation_interval_secs: DEFAULT_COMPENSATION_INTERVAL_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            reservation_ttl_secs: DEFAULT_RESERVATION_TTL_SECS,
            storage_timeout_ms: DEFAULT_STORAGE_TIMEOUT_MS,
        }
    }
}
