//! Storage layer for the credit ledger.
//!
//! This crate provides persistent storage for balances, the append-only
//! transaction log, open reservations and the compensation work queue.
//!
//! # Architecture
//!
//! With the `rocksdb-backend` feature, [`RocksStore`] keeps each table in its own
//! column family (see [`schema::cf`]) and writes every mutation as a single
//! `WriteBatch`. [`MemoryStore`] implements the same contract in memory for
//! tests and local runs.
//!
//! Both backends serialize mutations per user, so a check-and-decrement on a
//! balance can never interleave with another mutation of the same balance. A
//! `reference_id` maps to at most one transaction.
//!
//! # Example
//!
//! ```
//! use credit_ledger_core::{Category, UserId};
//! use credit_ledger_store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let user_id = UserId::generate();
//!
//! store
//!     .credit(&user_id, 500, Category::Purchase, "starter pack", Some("order-1"))
//!     .unwrap();
//! let balance = store.get_or_create_balance(&user_id).unwrap();
//! assert_eq!(balance.available_credits, 500);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::{DateTime, Duration, Utc};
use credit_ledger_core::{
    Category, CompensationTask, CreditTransaction, PendingDebit, ReservationId, TaskId,
    TaskStatus, UserCredits, UserId,
};

/// The storage trait defining all ledger operations.
///
/// Implementations must make every balance-mutating method atomic with respect
/// to other mutations of the same user.
pub trait Store: Send + Sync {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    /// Get a balance without creating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_balance(&self, user_id: &UserId) -> Result<Option<UserCredits>>;

    /// Get a balance, creating an empty one on first access.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_or_create_balance(&self, user_id: &UserId) -> Result<UserCredits>;

    /// Add credits and append the matching transaction.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidAmount` if `amount <= 0`.
    /// - `StoreError::DuplicateReference` if `reference_id` was already used.
    fn credit(
        &self,
        user_id: &UserId,
        amount: i64,
        category: Category,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<CreditTransaction>;

    /// Check spendable credits and remove `amount` in one step, appending the
    /// matching transaction.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidAmount` if `amount <= 0`.
    /// - `StoreError::InsufficientCredits` if the spendable balance is too low.
    /// - `StoreError::DuplicateReference` if `reference_id` was already used.
    fn debit(
        &self,
        user_id: &UserId,
        amount: i64,
        category: Category,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<CreditTransaction>;

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// Check if a transaction with this reference exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn transaction_exists(&self, reference_id: &str) -> Result<bool>;

    /// Get the transaction recorded for a reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction_by_reference(&self, reference_id: &str)
        -> Result<Option<CreditTransaction>>;

    /// List transactions for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>>;

    /// Count transactions for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_transactions_by_user(&self, user_id: &UserId) -> Result<u64>;

    // =========================================================================
    // Reservation Operations
    // =========================================================================

    /// Hold `amount` credits for `trade_id` and record the pending debit.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidAmount` if `amount <= 0`.
    /// - `StoreError::InsufficientCredits` if the spendable balance is too low.
    /// - `StoreError::DuplicateReference` if the trade was already charged.
    /// - `StoreError::ReservationOpen` if the trade already holds credits.
    fn reserve(
        &self,
        user_id: &UserId,
        trade_id: &str,
        amount: i64,
        ttl: Duration,
    ) -> Result<PendingDebit>;

    /// Get an open reservation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_reservation(&self, reservation_id: &ReservationId) -> Result<Option<PendingDebit>>;

    /// Find the open reservation for a trade.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_reservation_by_trade(&self, trade_id: &str) -> Result<Option<PendingDebit>>;

    /// Turn a hold into a debit with `reference_id = trade_id`.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the reservation is not open.
    /// - `StoreError::DuplicateReference` if the trade was charged by another
    ///   path; the hold is dropped in that case.
    fn confirm_reservation(
        &self,
        reservation_id: &ReservationId,
        category: Category,
        description: &str,
    ) -> Result<CreditTransaction>;

    /// Drop a hold without charging.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the reservation is not open.
    fn release_reservation(&self, reservation_id: &ReservationId) -> Result<PendingDebit>;

    /// List open reservations whose TTL elapsed before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<PendingDebit>>;

    // =========================================================================
    // Compensation Queue Operations
    // =========================================================================

    /// Insert or update a compensation task, maintaining the pending index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_compensation_task(&self, task: &CompensationTask) -> Result<()>;

    /// Get a compensation task by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_compensation_task(&self, task_id: &TaskId) -> Result<Option<CompensationTask>>;

    /// List tasks in `pending` status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_pending_compensation_tasks(&self) -> Result<Vec<CompensationTask>>;

    /// List all tasks, optionally filtered by status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_compensation_tasks(&self, status: Option<TaskStatus>)
        -> Result<Vec<CompensationTask>>;
}

/// Reject non-positive amounts.
pub(crate) fn ensure_positive(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(StoreError::InvalidAmount(amount));
    }
    Ok(())
}

/// Apply a credit to a loaded balance and build its transaction.
pub(crate) fn apply_credit(
    balance: &mut UserCredits,
    amount: i64,
    category: Category,
    description: &str,
    reference_id: Option<&str>,
) -> CreditTransaction {
    let tx = CreditTransaction::credit(
        balance.user_id,
        amount,
        balance.available_credits,
        category,
        description.to_string(),
        reference_id.map(ToString::to_string),
    );
    balance.apply_credit(amount);
    tx
}

/// Check spendable credits on a loaded balance, then apply the debit and build
/// its transaction. The balance is untouched on error.
pub(crate) fn apply_debit(
    balance: &mut UserCredits,
    amount: i64,
    category: Category,
    description: &str,
    reference_id: Option<&str>,
) -> Result<CreditTransaction> {
    if !balance.can_spend(amount) {
        return Err(StoreError::InsufficientCredits {
            available: balance.spendable(),
            required: amount,
        });
    }
    let tx = CreditTransaction::debit(
        balance.user_id,
        amount,
        balance.available_credits,
        category,
        description.to_string(),
        reference_id.map(ToString::to_string),
    );
    balance.apply_debit(amount);
    Ok(tx)
}
