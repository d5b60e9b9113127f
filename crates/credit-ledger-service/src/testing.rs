//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use credit_ledger_core::{
    Category, CompensationTask, CreditTransaction, LedgerConfig, PendingDebit, ReservationId,
    TaskId, TaskStatus, UserCredits, UserId,
};
use credit_ledger_store::{MemoryStore, Result, Store, StoreError};

use crate::Ledger;

/// A ledger over a fresh memory store with one funded user.
pub async fn ledger_with_balance(credits: i64) -> (Ledger, UserId) {
    ledger_with_config(credits, LedgerConfig::default()).await
}

/// Same as [`ledger_with_balance`] with custom tunables.
pub async fn ledger_with_config(credits: i64, config: LedgerConfig) -> (Ledger, UserId) {
    let ledger = Ledger::new(Arc::new(MemoryStore::new()), config);
    let user_id = UserId::generate();
    if credits > 0 {
        ledger
            .credit(user_id, credits, Category::Purchase, "seed", None)
            .await
            .unwrap();
    }
    (ledger, user_id)
}

/// Memory store that can stall every call or fail charges on demand.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_charges: AtomicBool,
    delay_ms: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `debit` and `confirm_reservation` fail with a database error.
    pub fn fail_charges(&self, fail: bool) {
        self.fail_charges.store(fail, Ordering::SeqCst);
    }

    /// Sleep this long inside every call.
    pub fn set_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    fn stall(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }

    fn charge_gate(&self) -> Result<()> {
        self.stall();
        if self.fail_charges.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected failure".into()));
        }
        Ok(())
    }
}

impl Store for FlakyStore {
    fn get_balance(&self, user_id: &UserId) -> Result<Option<UserCredits>> {
        self.stall();
        self.inner.get_balance(user_id)
    }

    fn get_or_create_balance(&self, user_id: &UserId) -> Result<UserCredits> {
        self.stall();
        self.inner.get_or_create_balance(user_id)
    }

    fn credit(
        &self,
        user_id: &UserId,
        amount: i64,
        category: Category,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<CreditTransaction> {
        self.stall();
        self.inner
            .credit(user_id, amount, category, description, reference_id)
    }

    fn debit(
        &self,
        user_id: &UserId,
        amount: i64,
        category: Category,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<CreditTransaction> {
        self.charge_gate()?;
        self.inner
            .debit(user_id, amount, category, description, reference_id)
    }

    fn transaction_exists(&self, reference_id: &str) -> Result<bool> {
        self.stall();
        self.inner.transaction_exists(reference_id)
    }

    fn get_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<CreditTransaction>> {
        self.stall();
        self.inner.get_transaction_by_reference(reference_id)
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        self.stall();
        self.inner.list_transactions_by_user(user_id, limit, offset)
    }

    fn count_transactions_by_user(&self, user_id: &UserId) -> Result<u64> {
        self.stall();
        self.inner.count_transactions_by_user(user_id)
    }

    fn reserve(
        &self,
        user_id: &UserId,
        trade_id: &str,
        amount: i64,
        ttl: chrono::Duration,
    ) -> Result<PendingDebit> {
        self.stall();
        self.inner.reserve(user_id, trade_id, amount, ttl)
    }

    fn get_reservation(&self, reservation_id: &ReservationId) -> Result<Option<PendingDebit>> {
        self.stall();
        self.inner.get_reservation(reservation_id)
    }

    fn find_reservation_by_trade(&self, trade_id: &str) -> Result<Option<PendingDebit>> {
        self.stall();
        self.inner.find_reservation_by_trade(trade_id)
    }

    fn confirm_reservation(
        &self,
        reservation_id: &ReservationId,
        category: Category,
        description: &str,
    ) -> Result<CreditTransaction> {
        self.charge_gate()?;
        self.inner
            .confirm_reservation(reservation_id, category, description)
    }

    fn release_reservation(&self, reservation_id: &ReservationId) -> Result<PendingDebit> {
        self.stall();
        self.inner.release_reservation(reservation_id)
    }

    fn list_expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<PendingDebit>> {
        self.stall();
        self.inner.list_expired_reservations(now)
    }

    fn put_compensation_task(&self, task: &CompensationTask) -> Result<()> {
        self.stall();
        self.inner.put_compensation_task(task)
    }

    fn get_compensation_task(&self, task_id: &TaskId) -> Result<Option<CompensationTask>> {
        self.stall();
        self.inner.get_compensation_task(task_id)
    }

    fn list_pending_compensation_tasks(&self) -> Result<Vec<CompensationTask>> {
        self.stall();
        self.inner.list_pending_compensation_tasks()
    }

    fn list_compensation_tasks(
        &self,
        status: Option<TaskStatus>,
    ) -> Result<Vec<CompensationTask>> {
        self.stall();
        self.inner.list_compensation_tasks(status)
    }
}
