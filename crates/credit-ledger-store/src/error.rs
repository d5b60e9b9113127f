//! Error types for ledger storage.

use credit_ledger_core::LedgerError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Amount was zero or negative.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// Insufficient spendable credits.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Spendable credits in the balance.
        available: i64,
        /// Required amount.
        required: i64,
    },

    /// A transaction with this reference already exists.
    #[error("duplicate reference: {reference_id}")]
    DuplicateReference {
        /// The reference that was duplicated.
        reference_id: String,
    },

    /// The trade already holds an open reservation.
    #[error("reservation already open for trade {trade_id}")]
    ReservationOpen {
        /// The trade identifier.
        trade_id: String,
    },
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(msg) => Self::StorageUnavailable(msg),
            StoreError::Serialization(msg) => Self::Internal(msg),
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} {id}")),
            StoreError::InvalidAmount(amount) => Self::InvalidAmount(amount),
            StoreError::InsufficientCredits {
                available,
                required,
            } => Self::InsufficientCredits {
                available,
                required,
            },
            StoreError::DuplicateReference { reference_id } => {
                Self::AlreadyProcessed { reference_id }
            }
            StoreError::ReservationOpen { trade_id } => Self::ReservationOpen { trade_id },
        }
    }
}
