//! In-memory storage implementation.
//!
//! All tables live behind one mutex, which trivially serializes mutations.
//! Intended for tests and local development.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use credit_ledger_core::{
    Category, CompensationTask, CreditTransaction, PendingDebit, ReservationId, TaskId,
    TaskStatus, UserCredits, UserId,
};

use crate::error::{Result, StoreError};
use crate::{apply_credit, apply_debit, ensure_positive, Store};

#[derive(Debug, Default)]
struct Tables {
    balances: HashMap<UserId, UserCredits>,
    // Append-only, insertion order is chronological.
    transactions: Vec<CreditTransaction>,
    by_reference: HashMap<String, usize>,
    reservations: BTreeMap<ReservationId, PendingDebit>,
    by_trade: HashMap<String, ReservationId>,
    tasks: BTreeMap<TaskId, CompensationTask>,
}

impl Tables {
    fn balance_mut(&mut self, user_id: &UserId) -> &mut UserCredits {
        self.balances
            .entry(*user_id)
            .or_insert_with(|| UserCredits::new(*user_id))
    }

    fn ensure_unused(&self, reference_id: Option<&str>) -> Result<()> {
        match reference_id {
            Some(reference) if self.by_reference.contains_key(reference) => {
                Err(StoreError::DuplicateReference {
                    reference_id: reference.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn append(&mut self, tx: CreditTransaction) {
        if let Some(reference) = &tx.reference_id {
            self.by_reference
                .insert(reference.clone(), self.transactions.len());
        }
        self.transactions.push(tx);
    }

    fn take_reservation(&mut self, reservation_id: &ReservationId) -> Result<PendingDebit> {
        let hold = self
            .reservations
            .remove(reservation_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "reservation",
                id: reservation_id.to_string(),
            })?;
        self.by_trade.remove(&hold.trade_id);
        self.balance_mut(&hold.user_id).unhold(hold.amount);
        Ok(hold)
    }
}

/// Thread-safe in-memory [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get_balance(&self, user_id: &UserId) -> Result<Option<UserCredits>> {
        Ok(self.tables.lock().balances.get(user_id).cloned())
    }

    fn get_or_create_balance(&self, user_id: &UserId) -> Result<UserCredits> {
        Ok(self.tables.lock().balance_mut(user_id).clone())
    }

    fn credit(
        &self,
        user_id: &UserId,
        amount: i64,
        category: Category,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<CreditTransaction> {
        ensure_positive(amount)?;
        let mut tables = self.tables.lock();
        tables.ensure_unused(reference_id)?;

        let tx = apply_credit(
            tables.balance_mut(user_id),
            amount,
            category,
            description,
            reference_id,
        );
        tables.append(tx.clone());
        Ok(tx)
    }

    fn debit(
        &self,
        user_id: &UserId,
        amount: i64,
        category: Category,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<CreditTransaction> {
        ensure_positive(amount)?;
        let mut tables = self.tables.lock();
        tables.ensure_unused(reference_id)?;

        let tx = apply_debit(
            tables.balance_mut(user_id),
            amount,
            category,
            description,
            reference_id,
        )?;
        tables.append(tx.clone());
        Ok(tx)
    }

    fn transaction_exists(&self, reference_id: &str) -> Result<bool> {
        Ok(self.tables.lock().by_reference.contains_key(reference_id))
    }

    fn get_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<CreditTransaction>> {
        let tables = self.tables.lock();
        Ok(tables
            .by_reference
            .get(reference_id)
            .and_then(|&index| tables.transactions.get(index))
            .cloned())
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let tables = self.tables.lock();
        Ok(tables
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.user_id == *user_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn count_transactions_by_user(&self, user_id: &UserId) -> Result<u64> {
        let tables = self.tables.lock();
        let count = tables
            .transactions
            .iter()
            .filter(|tx| tx.user_id == *user_id)
            .count();
        Ok(count as u64)
    }

    fn reserve(
        &self,
        user_id: &UserId,
        trade_id: &str,
        amount: i64,
        ttl: Duration,
    ) -> Result<PendingDebit> {
        ensure_positive(amount)?;
        let mut tables = self.tables.lock();
        tables.ensure_unused(Some(trade_id))?;
        if tables.by_trade.contains_key(trade_id) {
            return Err(StoreError::ReservationOpen {
                trade_id: trade_id.to_string(),
            });
        }

        let balance = tables.balance_mut(user_id);
        if !balance.can_spend(amount) {
            return Err(StoreError::InsufficientCredits {
                available: balance.spendable(),
                required: amount,
            });
        }
        balance.hold(amount);

        let hold = PendingDebit::new(*user_id, trade_id.to_string(), amount, ttl);
        tables.by_trade.insert(hold.trade_id.clone(), hold.id);
        tables.reservations.insert(hold.id, hold.clone());
        Ok(hold)
    }

    fn get_reservation(&self, reservation_id: &ReservationId) -> Result<Option<PendingDebit>> {
        Ok(self.tables.lock().reservations.get(reservation_id).cloned())
    }

    fn find_reservation_by_trade(&self, trade_id: &str) -> Result<Option<PendingDebit>> {
        let tables = self.tables.lock();
        Ok(tables
            .by_trade
            .get(trade_id)
            .and_then(|id| tables.reservations.get(id))
            .cloned())
    }

    fn confirm_reservation(
        &self,
        reservation_id: &ReservationId,
        category: Category,
        description: &str,
    ) -> Result<CreditTransaction> {
        let mut tables = self.tables.lock();
        let hold = tables.take_reservation(reservation_id)?;
        tables.ensure_unused(Some(hold.trade_id.as_str()))?;

        let tx = apply_debit(
            tables.balance_mut(&hold.user_id),
            hold.amount,
            category,
            description,
            Some(hold.trade_id.as_str()),
        )?;
        tables.append(tx.clone());
        Ok(tx)
    }

    fn release_reservation(&self, reservation_id: &ReservationId) -> Result<PendingDebit> {
        self.tables.lock().take_reservation(reservation_id)
    }

    fn list_expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<PendingDebit>> {
        Ok(self
            .tables
            .lock()
            .reservations
            .values()
            .filter(|hold| hold.is_expired(now))
            .cloned()
            .collect())
    }

    fn put_compensation_task(&self, task: &CompensationTask) -> Result<()> {
        self.tables.lock().tasks.insert(task.id, task.clone());
        Ok(())
    }

    fn get_compensation_task(&self, task_id: &TaskId) -> Result<Option<CompensationTask>> {
        Ok(self.tables.lock().tasks.get(task_id).cloned())
    }

    fn list_pending_compensation_tasks(&self) -> Result<Vec<CompensationTask>> {
        self.list_compensation_tasks(Some(TaskStatus::Pending))
    }

    fn list_compensation_tasks(
        &self,
        status: Option<TaskStatus>,
    ) -> Result<Vec<CompensationTask>> {
        Ok(self
            .tables
            .lock()
            .tasks
            .values()
            .filter(|task| status.map_or(true, |s| task.status == s))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credit_ledger_core::{TradeDetails, TransactionKind};

    fn funded(store: &MemoryStore, credits: i64) -> UserId {
        let user_id = UserId::generate();
        store
            .credit(&user_id, credits, Category::Purchase, "seed", None)
            .unwrap();
        user_id
    }

    #[test]
    fn get_or_create_is_lazy() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        assert!(store.get_balance(&user_id).unwrap().is_none());

        let balance = store.get_or_create_balance(&user_id).unwrap();
        assert_eq!(balance.available_credits, 0);
        assert!(store.get_balance(&user_id).unwrap().is_some());
    }

    #[test]
    fn debit_records_before_and_after() {
        let store = MemoryStore::new();
        let user_id = funded(&store, 10);

        let tx = store
            .debit(&user_id, 4, Category::Trade, "trade", Some("t-1"))
            .unwrap();
        assert_eq!(tx.kind, TransactionKind::Debit);
        assert_eq!((tx.balance_before, tx.balance_after), (10, 6));

        let balance = store.get_balance(&user_id).unwrap().unwrap();
        assert_eq!(balance.used_credits, 4);
        assert!(balance.is_consistent());
    }

    #[test]
    fn debit_rejects_overdraft_and_bad_amounts() {
        let store = MemoryStore::new();
        let user_id = funded(&store, 1);

        let err = store
            .debit(&user_id, 2, Category::Trade, "trade", None)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientCredits {
                available: 1,
                required: 2
            }
        ));
        assert!(matches!(
            store.credit(&user_id, 0, Category::Bonus, "", None),
            Err(StoreError::InvalidAmount(0))
        ));
        assert_eq!(store.count_transactions_by_user(&user_id).unwrap(), 1);
    }

    #[test]
    fn references_are_unique() {
        let store = MemoryStore::new();
        let user_id = funded(&store, 5);

        store
            .debit(&user_id, 1, Category::Trade, "trade", Some("t-1"))
            .unwrap();
        let err = store
            .debit(&user_id, 1, Category::Trade, "trade", Some("t-1"))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateReference { .. }));
        assert!(store.transaction_exists("t-1").unwrap());
        assert_eq!(
            store.get_balance(&user_id).unwrap().unwrap().available_credits,
            4
        );
    }

    #[test]
    fn reservation_hold_confirm_release() {
        let store = MemoryStore::new();
        let user_id = funded(&store, 2);
        let ttl = Duration::minutes(5);

        let first = store.reserve(&user_id, "t-1", 1, ttl).unwrap();
        let second = store.reserve(&user_id, "t-2", 1, ttl).unwrap();
        assert!(matches!(
            store.reserve(&user_id, "t-3", 1, ttl),
            Err(StoreError::InsufficientCredits { available: 0, .. })
        ));

        let tx = store
            .confirm_reservation(&first.id, Category::Trade, "trade")
            .unwrap();
        assert_eq!(tx.reference_id.as_deref(), Some("t-1"));
        store.release_reservation(&second.id).unwrap();

        let balance = store.get_balance(&user_id).unwrap().unwrap();
        assert_eq!(balance.available_credits, 1);
        assert_eq!(balance.reserved_credits, 0);
        assert!(store.find_reservation_by_trade("t-2").unwrap().is_none());
        assert!(matches!(
            store.release_reservation(&second.id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn one_open_reservation_per_trade() {
        let store = MemoryStore::new();
        let user_id = funded(&store, 3);
        store
            .reserve(&user_id, "t-1", 1, Duration::minutes(5))
            .unwrap();
        assert!(matches!(
            store.reserve(&user_id, "t-1", 1, Duration::minutes(5)),
            Err(StoreError::ReservationOpen { .. })
        ));
    }

    #[test]
    fn expired_reservations_are_listed() {
        let store = MemoryStore::new();
        let user_id = funded(&store, 3);
        store
            .reserve(&user_id, "stale", 1, Duration::seconds(-1))
            .unwrap();
        store
            .reserve(&user_id, "fresh", 1, Duration::minutes(5))
            .unwrap();

        let expired = store.list_expired_reservations(Utc::now()).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].trade_id, "stale");
    }

    #[test]
    fn pending_task_listing_tracks_status() {
        let store = MemoryStore::new();
        let mut task = CompensationTask::new(
            "t-1".into(),
            UserId::generate(),
            1,
            TradeDetails::new("ETHUSDT", "open_short", "trader-2"),
            3,
        );
        store.put_compensation_task(&task).unwrap();
        assert_eq!(store.list_pending_compensation_tasks().unwrap().len(), 1);

        task.mark_complete();
        store.put_compensation_task(&task).unwrap();
        assert!(store.list_pending_compensation_tasks().unwrap().is_empty());
        assert_eq!(
            store
                .list_compensation_tasks(Some(TaskStatus::Complete))
                .unwrap()
                .len(),
            1
        );
    }
}
