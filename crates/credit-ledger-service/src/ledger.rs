//! Async ledger facade.
//!
//! Every store call runs on the blocking pool under
//! [`LedgerConfig::storage_timeout`]. A call that does not finish in time is
//! reported as [`LedgerError::StorageUnavailable`]; the underlying write may
//! still land, which is why every charge carries a reference id and the
//! compensation loop checks for it before retrying.

use std::sync::Arc;

use credit_ledger_core::{
    BalanceView, Category, CompensationTask, CreditSummary, CreditTransaction, LedgerConfig,
    LedgerError, PendingDebit, ReservationId, Result, TaskStatus, TradeDetails, UserCredits,
    UserId, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
use credit_ledger_store::Store;

use crate::reservation::Reservation;

/// Shared handle to the ledger. Cheap to clone.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
    config: LedgerConfig,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Create a ledger over a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// The ledger tunables.
    #[must_use]
    pub const fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Run a store call on the blocking pool, bounded by the storage timeout.
    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Store) -> credit_ledger_store::Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || f(store.as_ref()));

        match tokio::time::timeout(self.config.storage_timeout(), task).await {
            Ok(Ok(result)) => result.map_err(LedgerError::from),
            Ok(Err(join_err)) => Err(LedgerError::Internal(format!(
                "{op} task failed: {join_err}"
            ))),
            Err(_) => {
                tracing::warn!(
                    op,
                    timeout_ms = self.config.storage_timeout_ms,
                    "Storage call timed out"
                );
                Err(LedgerError::StorageUnavailable(format!("{op} timed out")))
            }
        }
    }

    // =========================================================================
    // Ledger Store Operations
    // =========================================================================

    /// Get a balance, creating an empty one on first access.
    pub async fn get_or_create_balance(&self, user_id: UserId) -> Result<UserCredits> {
        self.run("get_or_create_balance", move |store| {
            store.get_or_create_balance(&user_id)
        })
        .await
    }

    /// Add credits.
    ///
    /// A `reference_id` that was already used fails with
    /// [`LedgerError::AlreadyProcessed`] and changes nothing.
    pub async fn credit(
        &self,
        user_id: UserId,
        amount: i64,
        category: Category,
        description: impl Into<String>,
        reference_id: Option<String>,
    ) -> Result<CreditTransaction> {
        let description = description.into();
        let tx = self
            .run("credit", move |store| {
                store.credit(
                    &user_id,
                    amount,
                    category,
                    &description,
                    reference_id.as_deref(),
                )
            })
            .await?;

        tracing::info!(
            user_id = %user_id,
            transaction_id = %tx.id,
            amount,
            category = %category,
            balance_after = tx.balance_after,
            "Credits added"
        );
        Ok(tx)
    }

    /// Remove credits if the spendable balance covers `amount`.
    pub async fn debit(
        &self,
        user_id: UserId,
        amount: i64,
        category: Category,
        description: impl Into<String>,
        reference_id: Option<String>,
    ) -> Result<CreditTransaction> {
        let description = description.into();
        let tx = self
            .run("debit", move |store| {
                store.debit(
                    &user_id,
                    amount,
                    category,
                    &description,
                    reference_id.as_deref(),
                )
            })
            .await?;

        tracing::info!(
            user_id = %user_id,
            transaction_id = %tx.id,
            amount,
            category = %category,
            balance_after = tx.balance_after,
            "Credits debited"
        );
        Ok(tx)
    }

    /// Check whether a transaction with this reference exists.
    pub async fn transaction_exists(&self, reference_id: &str) -> Result<bool> {
        let reference_id = reference_id.to_string();
        self.run("transaction_exists", move |store| {
            store.transaction_exists(&reference_id)
        })
        .await
    }

    /// Get the transaction recorded for a reference.
    pub async fn transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<CreditTransaction>> {
        let reference_id = reference_id.to_string();
        self.run("get_transaction_by_reference", move |store| {
            store.get_transaction_by_reference(&reference_id)
        })
        .await
    }

    /// Apply a signed adjustment tagged `admin_adjust`.
    ///
    /// Positive deltas credit, negative deltas debit with the usual balance
    /// check. The admin id, IP and reason are embedded in the description.
    /// Inputs are expected to be validated by [`crate::admin`].
    pub async fn adjust_balance(
        &self,
        admin_id: &str,
        user_id: UserId,
        delta: i64,
        reason: &str,
        ip_address: &str,
    ) -> Result<CreditTransaction> {
        let description = format!("Admin adjustment by {admin_id} from {ip_address}: {reason}");

        let tx = match delta {
            0 => return Err(LedgerError::InvalidAmount(0)),
            d if d > 0 => {
                self.credit(user_id, d, Category::AdminAdjust, description, None)
                    .await?
            }
            d => {
                let amount = d
                    .checked_neg()
                    .ok_or_else(|| LedgerError::Validation("delta out of range".into()))?;
                self.debit(user_id, amount, Category::AdminAdjust, description, None)
                    .await?
            }
        };

        tracing::info!(
            admin_id = %admin_id,
            user_id = %user_id,
            delta,
            ip_address = %ip_address,
            transaction_id = %tx.id,
            "Admin adjustment applied"
        );
        Ok(tx)
    }

    // =========================================================================
    // Query Surface
    // =========================================================================

    /// Current balance. Users without a row read as zero.
    pub async fn get_balance(&self, user_id: UserId) -> Result<BalanceView> {
        let balance = self
            .run("get_balance", move |store| store.get_balance(&user_id))
            .await?
            .unwrap_or_else(|| UserCredits::new(user_id));
        Ok(BalanceView::from(&balance))
    }

    /// One page of history, newest first, and the total count.
    ///
    /// `page` is 1-based; `0` reads as the first page. `limit` is clamped to
    /// `1..=MAX_PAGE_LIMIT` and defaults to `DEFAULT_PAGE_LIMIT`.
    pub async fn get_transactions(
        &self,
        user_id: UserId,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<(Vec<CreditTransaction>, u64)> {
        let (offset, limit) = page_window(page, limit);
        self.run("get_transactions", move |store| {
            let transactions = store.list_transactions_by_user(&user_id, limit, offset)?;
            let total = store.count_transactions_by_user(&user_id)?;
            Ok((transactions, total))
        })
        .await
    }

    /// Balance figures plus the number of ledger entries.
    pub async fn get_summary(&self, user_id: UserId) -> Result<CreditSummary> {
        self.run("get_summary", move |store| {
            let balance = store
                .get_balance(&user_id)?
                .unwrap_or_else(|| UserCredits::new(user_id));
            let transaction_count = store.count_transactions_by_user(&user_id)?;
            Ok(CreditSummary {
                total: balance.total_credits,
                available: balance.available_credits,
                used: balance.used_credits,
                transaction_count,
            })
        })
        .await
    }

    // =========================================================================
    // Reservation Protocol
    // =========================================================================

    /// Reserve the configured per-action cost for `trade_id`.
    pub async fn reserve(&self, user_id: UserId, trade_id: &str) -> Result<Reservation> {
        self.reserve_amount(user_id, trade_id, self.config.credit_cost_per_action)
            .await
    }

    /// Reserve `amount` credits for `trade_id`.
    ///
    /// If the trade was already charged the handle comes back confirmed.
    pub async fn reserve_amount(
        &self,
        user_id: UserId,
        trade_id: &str,
        amount: i64,
    ) -> Result<Reservation> {
        if trade_id.trim().is_empty() {
            return Err(LedgerError::Validation("trade_id must not be empty".into()));
        }

        if self.transaction_exists(trade_id).await? {
            tracing::debug!(user_id = %user_id, trade_id = %trade_id, "Trade already charged");
            return Ok(Reservation::already_processed(
                self.clone(),
                user_id,
                trade_id.to_string(),
                amount,
            ));
        }

        let ttl = self.config.reservation_ttl();
        let owned_trade = trade_id.to_string();
        let result = self
            .run("reserve", move |store| {
                store.reserve(&user_id, &owned_trade, amount, ttl)
            })
            .await;

        match result {
            Ok(hold) => {
                tracing::debug!(
                    user_id = %user_id,
                    trade_id = %trade_id,
                    reservation_id = %hold.id,
                    amount,
                    "Credits reserved"
                );
                Ok(Reservation::created(self.clone(), hold))
            }
            // Charged between the check and the hold.
            Err(LedgerError::AlreadyProcessed { .. }) => Ok(Reservation::already_processed(
                self.clone(),
                user_id,
                trade_id.to_string(),
                amount,
            )),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn confirm_hold(
        &self,
        reservation_id: ReservationId,
        description: String,
    ) -> Result<CreditTransaction> {
        self.run("confirm_reservation", move |store| {
            store.confirm_reservation(&reservation_id, Category::Trade, &description)
        })
        .await
    }

    pub(crate) async fn release_hold(&self, reservation_id: ReservationId) -> Result<PendingDebit> {
        self.run("release_reservation", move |store| {
            store.release_reservation(&reservation_id)
        })
        .await
    }

    pub(crate) async fn find_hold_by_trade(&self, trade_id: &str) -> Result<Option<PendingDebit>> {
        let trade_id = trade_id.to_string();
        self.run("find_reservation_by_trade", move |store| {
            store.find_reservation_by_trade(&trade_id)
        })
        .await
    }

    pub(crate) async fn expired_holds(&self) -> Result<Vec<PendingDebit>> {
        let now = chrono::Utc::now();
        self.run("list_expired_reservations", move |store| {
            store.list_expired_reservations(now)
        })
        .await
    }

    // =========================================================================
    // Compensation Queue
    // =========================================================================

    /// Queue a trade debit for the compensation loop.
    pub async fn enqueue_compensation(
        &self,
        user_id: UserId,
        trade_id: &str,
        amount: i64,
        details: TradeDetails,
    ) -> Result<CompensationTask> {
        let task = CompensationTask::new(
            trade_id.to_string(),
            user_id,
            amount,
            details,
            self.config.max_retries,
        );
        self.save_task(task.clone()).await?;

        tracing::warn!(
            task_id = %task.id,
            user_id = %user_id,
            trade_id = %trade_id,
            "Trade debit deferred to compensation"
        );
        Ok(task)
    }

    /// All compensation tasks, optionally filtered by status.
    pub async fn list_compensation_tasks(
        &self,
        status: Option<TaskStatus>,
    ) -> Result<Vec<CompensationTask>> {
        self.run("list_compensation_tasks", move |store| {
            store.list_compensation_tasks(status)
        })
        .await
    }

    pub(crate) async fn pending_compensation_tasks(&self) -> Result<Vec<CompensationTask>> {
        self.run("list_pending_compensation_tasks", |store| {
            store.list_pending_compensation_tasks()
        })
        .await
    }

    pub(crate) async fn save_task(&self, task: CompensationTask) -> Result<()> {
        self.run("put_compensation_task", move |store| {
            store.put_compensation_task(&task)
        })
        .await
    }
}

/// Translate a 1-based page and optional limit into `(offset, limit)`.
fn page_window(page: Option<usize>, limit: Option<usize>) -> (usize, usize) {
    let limit = limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let page = page.unwrap_or(1).max(1);
    ((page - 1).saturating_mul(limit), limit)
}
