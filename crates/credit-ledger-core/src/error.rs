//! Error types for the credit ledger.

use crate::ids::IdError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors surfaced by the ledger, the reservation protocol and admin paths.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Amount was zero or negative.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// Balance too low for the operation.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Spendable credits at the time of the check.
        available: i64,
        /// Credits the operation needed.
        required: i64,
    },

    /// `Confirm` called on a reservation that is already confirmed.
    #[error("reservation already confirmed")]
    AlreadyConfirmed,

    /// `Release` or `Confirm` called on a reservation that is already released.
    #[error("reservation already released")]
    AlreadyReleased,

    /// A transaction with this reference already exists.
    #[error("already processed: {reference_id}")]
    AlreadyProcessed {
        /// The idempotency key that was seen before.
        reference_id: String,
    },

    /// Another handle already holds credits for this trade.
    #[error("reservation already open for trade {trade_id}")]
    ReservationOpen {
        /// The trade whose reservation is still open.
        trade_id: String,
    },

    /// Storage could not be reached in time. Retryable.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Malformed request.
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Unexpected failure, e.g. a corrupt record.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Whether the same call may succeed if simply retried later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_errors_are_retryable() {
        assert!(LedgerError::StorageUnavailable("timeout".into()).is_retryable());
        assert!(!LedgerError::InvalidAmount(0).is_retryable());
        assert!(!LedgerError::InsufficientCredits {
            available: 0,
            required: 1
        }
        .is_retryable());
    }

    #[test]
    fn messages() {
        let err = LedgerError::InsufficientCredits {
            available: 2,
            required: 5,
        };
        assert_eq!(err.to_string(), "insufficient credits: available=2, required=5");
    }
}
