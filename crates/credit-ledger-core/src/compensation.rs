//! Compensation work items.
//!
//! A [`CompensationTask`] records a trade whose debit could not be written
//! synchronously. The compensation loop drives it to a terminal state; rows are
//! kept afterwards as an audit trail.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TaskId, UserId};

/// A deferred trade debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationTask {
    /// Task identifier.
    pub id: TaskId,

    /// Idempotency key shared with the original reservation.
    pub trade_id: String,

    /// The user to charge.
    pub user_id: UserId,

    /// Traded instrument.
    pub symbol: String,

    /// Trade side or decision (e.g. `buy`, `close_long`).
    pub action: String,

    /// Trader that produced the decision.
    pub trader_id: String,

    /// Credits to debit.
    pub amount: i64,

    /// Failed attempts so far.
    pub retry_count: u32,

    /// Attempts allowed before the task is marked failed.
    pub max_retries: u32,

    /// Current status.
    pub status: TaskStatus,

    /// Error from the latest failed attempt.
    pub last_error: Option<String>,

    /// When the task was enqueued.
    pub created_at: DateTime<Utc>,

    /// When the task was last touched.
    pub updated_at: DateTime<Utc>,
}

/// Trade details carried from the reservation to the ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeDetails {
    /// Traded instrument.
    pub symbol: String,
    /// Trade side or decision.
    pub action: String,
    /// Trader that produced the decision.
    pub trader_id: String,
}

impl TradeDetails {
    /// Bundle trade details.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        action: impl Into<String>,
        trader_id: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            action: action.into(),
            trader_id: trader_id.into(),
        }
    }

    /// Ledger description for the trade debit.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "AI trade decision: {} {} (trader {})",
            self.action, self.symbol, self.trader_id
        )
    }
}

impl CompensationTask {
    /// Create a pending task.
    #[must_use]
    pub fn new(
        trade_id: String,
        user_id: UserId,
        amount: i64,
        details: TradeDetails,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::generate(),
            trade_id,
            user_id,
            symbol: details.symbol,
            action: details.action,
            trader_id: details.trader_id,
            amount,
            retry_count: 0,
            max_retries,
            status: TaskStatus::Pending,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Trade details for the ledger entry.
    #[must_use]
    pub fn details(&self) -> TradeDetails {
        TradeDetails::new(&self.symbol, &self.action, &self.trader_id)
    }

    /// Mark the debit as landed.
    pub fn mark_complete(&mut self) {
        self.status = TaskStatus::Complete;
        self.updated_at = Utc::now();
    }

    /// Record a failed attempt. Returns `true` if the retry budget is now spent
    /// and the task moved to [`TaskStatus::Failed`].
    pub fn record_failure(&mut self, error: impl Into<String>) -> bool {
        self.retry_count += 1;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
        if self.retry_count >= self.max_retries {
            self.status = TaskStatus::Failed;
            true
        } else {
            false
        }
    }
}

/// Status of a compensation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for the next tick.
    Pending,
    /// The matching transaction exists.
    Complete,
    /// Retry budget exhausted; needs an operator.
    Failed,
}

impl TaskStatus {
    /// Complete and Failed are final.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// The stable lowercase tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}
