//! Column family layout.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Per-user balances, keyed by `user_id`.
    pub const BALANCES: &str = "balances";

    /// Ledger entries, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Unique index: `reference_id` to `transaction_id`.
    pub const TRANSACTIONS_BY_REFERENCE: &str = "transactions_by_reference";

    /// Open reservations, keyed by `reservation_id`.
    pub const RESERVATIONS: &str = "reservations";

    /// Index: open reservation by `trade_id`.
    pub const RESERVATIONS_BY_TRADE: &str = "reservations_by_trade";

    /// Compensation tasks, keyed by `task_id`. Never pruned.
    pub const COMPENSATION_TASKS: &str = "compensation_tasks";

    /// Index: ids of tasks still in `pending` status. Value is empty.
    pub const COMPENSATION_PENDING: &str = "compensation_pending";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::BALANCES,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::TRANSACTIONS_BY_REFERENCE,
        cf::RESERVATIONS,
        cf::RESERVATIONS_BY_TRADE,
        cf::COMPENSATION_TASKS,
        cf::COMPENSATION_PENDING,
    ]
}
