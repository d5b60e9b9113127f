//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//!
//! `RocksDB` has no row locks, so balance mutations take a striped per-user
//! mutex around their read-check-write, and reference-keyed writes additionally
//! take a striped per-reference mutex. Locks are always acquired user first,
//! then reference. Each mutation is committed as one `WriteBatch`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, MutexGuard};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use credit_ledger_core::{
    Category, CompensationTask, CreditTransaction, PendingDebit, ReservationId, TaskId,
    TaskStatus, TransactionId, UserCredits, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{apply_credit, apply_debit, ensure_positive, Store};

/// Number of lock stripes per lock family.
const LOCK_STRIPES: usize = 64;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    user_locks: Box<[Mutex<()>]>,
    reference_locks: Box<[Mutex<()>]>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!("ledger column families opened");

        Ok(Self {
            db: Arc::new(db),
            user_locks: stripes(),
            reference_locks: stripes(),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, family: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(family)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn has_key(&self, family: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(family)?;
        Ok(self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some())
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn lock_user(&self, user_id: &UserId) -> MutexGuard<'_, ()> {
        self.user_locks[stripe_of(user_id)].lock()
    }

    fn lock_reference(&self, reference_id: Option<&str>) -> Option<MutexGuard<'_, ()>> {
        reference_id.map(|reference| self.reference_locks[stripe_of(reference)].lock())
    }

    fn ensure_unused(&self, reference_id: Option<&str>) -> Result<()> {
        if let Some(reference) = reference_id {
            if self.transaction_exists(reference)? {
                return Err(StoreError::DuplicateReference {
                    reference_id: reference.to_string(),
                });
            }
        }
        Ok(())
    }

    fn load_balance(&self, user_id: &UserId) -> Result<UserCredits> {
        Ok(self
            .get_value(cf::BALANCES, &keys::balance_key(user_id))?
            .unwrap_or_else(|| UserCredits::new(*user_id)))
    }

    /// Stage a balance row.
    fn stage_balance(&self, batch: &mut WriteBatch, balance: &UserCredits) -> Result<()> {
        let cf_balances = self.cf(cf::BALANCES)?;
        batch.put_cf(
            &cf_balances,
            keys::balance_key(&balance.user_id),
            Self::serialize(balance)?,
        );
        Ok(())
    }

    /// Stage a transaction with its user and reference index entries.
    fn stage_transaction(&self, batch: &mut WriteBatch, tx: &CreditTransaction) -> Result<()> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        batch.put_cf(&cf_tx, keys::transaction_key(&tx.id), Self::serialize(tx)?);
        batch.put_cf(
            &cf_by_user,
            keys::user_transaction_key(&tx.user_id, &tx.id),
            b"",
        ); // Index entry (empty value)

        if let Some(reference) = &tx.reference_id {
            let cf_by_ref = self.cf(cf::TRANSACTIONS_BY_REFERENCE)?;
            batch.put_cf(
                &cf_by_ref,
                keys::reference_key(reference),
                tx.id.to_bytes(),
            );
        }
        Ok(())
    }

    /// Stage removal of an open reservation and its trade index entry.
    fn stage_reservation_removal(&self, batch: &mut WriteBatch, hold: &PendingDebit) -> Result<()> {
        let cf_reservations = self.cf(cf::RESERVATIONS)?;
        let cf_by_trade = self.cf(cf::RESERVATIONS_BY_TRADE)?;
        batch.delete_cf(&cf_reservations, keys::reservation_key(&hold.id));
        batch.delete_cf(&cf_by_trade, keys::trade_key(&hold.trade_id));
        Ok(())
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>> {
        self.get_value(cf::TRANSACTIONS, &keys::transaction_key(transaction_id))
    }

    /// Collect the transaction index keys of a user, oldest first.
    fn user_index_keys(&self, user_id: &UserId) -> Result<Vec<Box<[u8]>>> {
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);

        let iter = self
            .db
            .iterator_cf(&cf_by_user, IteratorMode::From(&prefix, Direction::Forward));

        let mut index_keys = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            index_keys.push(key);
        }
        Ok(index_keys)
    }

    /// Remove a hold under the owner's lock, optionally turning it into a debit.
    fn settle_reservation(
        &self,
        reservation_id: &ReservationId,
        charge: Option<(Category, &str)>,
    ) -> Result<(PendingDebit, Option<CreditTransaction>)> {
        let not_found = || StoreError::NotFound {
            entity: "reservation",
            id: reservation_id.to_string(),
        };
        let key = keys::reservation_key(reservation_id);

        let owner = self
            .get_value::<PendingDebit>(cf::RESERVATIONS, &key)?
            .ok_or_else(not_found)?
            .user_id;

        let _user_guard = self.lock_user(&owner);
        // Re-read under the lock; a concurrent settle may have won.
        let hold: PendingDebit = self
            .get_value(cf::RESERVATIONS, &key)?
            .ok_or_else(not_found)?;
        let _ref_guard = self.lock_reference(Some(hold.trade_id.as_str()));

        let mut balance = self.load_balance(&hold.user_id)?;
        balance.unhold(hold.amount);

        let mut batch = WriteBatch::default();
        self.stage_reservation_removal(&mut batch, &hold)?;

        let Some((category, description)) = charge else {
            self.stage_balance(&mut batch, &balance)?;
            self.write(batch)?;
            return Ok((hold, None));
        };

        if self.transaction_exists(&hold.trade_id)? {
            self.stage_balance(&mut batch, &balance)?;
            self.write(batch)?;
            return Err(StoreError::DuplicateReference {
                reference_id: hold.trade_id,
            });
        }

        let tx = apply_debit(
            &mut balance,
            hold.amount,
            category,
            description,
            Some(hold.trade_id.as_str()),
        )?;
        self.stage_balance(&mut batch, &balance)?;
        self.stage_transaction(&mut batch, &tx)?;
        self.write(batch)?;
        Ok((hold, Some(tx)))
    }

    fn scan_tasks(&self, ids: Option<Vec<Box<[u8]>>>) -> Result<Vec<CompensationTask>> {
        let cf_tasks = self.cf(cf::COMPENSATION_TASKS)?;
        let mut tasks = Vec::new();

        match ids {
            Some(ids) => {
                for id in ids {
                    if let Some(task) = self.get_value(cf::COMPENSATION_TASKS, &id)? {
                        tasks.push(task);
                    }
                }
            }
            None => {
                for item in self.db.iterator_cf(&cf_tasks, IteratorMode::Start) {
                    let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
                    tasks.push(Self::deserialize(&value)?);
                }
            }
        }
        Ok(tasks)
    }
}

fn stripes() -> Box<[Mutex<()>]> {
    (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect()
}

fn stripe_of<K: Hash + ?Sized>(key: &K) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    #[allow(clippy::cast_possible_truncation)]
    let slot = hasher.finish() as usize;
    slot % LOCK_STRIPES
}

impl Store for RocksStore {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    fn get_balance(&self, user_id: &UserId) -> Result<Option<UserCredits>> {
        self.get_value(cf::BALANCES, &keys::balance_key(user_id))
    }

    fn get_or_create_balance(&self, user_id: &UserId) -> Result<UserCredits> {
        if let Some(balance) = self.get_balance(user_id)? {
            return Ok(balance);
        }

        let _guard = self.lock_user(user_id);
        if let Some(balance) = self.get_balance(user_id)? {
            return Ok(balance);
        }

        let balance = UserCredits::new(*user_id);
        let mut batch = WriteBatch::default();
        self.stage_balance(&mut batch, &balance)?;
        self.write(batch)?;

        tracing::debug!(user_id = %user_id, "Balance row created");
        Ok(balance)
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
        let _user_guard = self.lock_user(user_id);
        let _ref_guard = self.lock_reference(reference_id);
        self.ensure_unused(reference_id)?;

        let mut balance = self.load_balance(user_id)?;
        let tx = apply_credit(&mut balance, amount, category, description, reference_id);

        let mut batch = WriteBatch::default();
        self.stage_balance(&mut batch, &balance)?;
        self.stage_transaction(&mut batch, &tx)?;
        self.write(batch)?;

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
        let _user_guard = self.lock_user(user_id);
        let _ref_guard = self.lock_reference(reference_id);
        self.ensure_unused(reference_id)?;

        let mut balance = self.load_balance(user_id)?;
        let tx = apply_debit(&mut balance, amount, category, description, reference_id)?;

        let mut batch = WriteBatch::default();
        self.stage_balance(&mut batch, &balance)?;
        self.stage_transaction(&mut batch, &tx)?;
        self.write(batch)?;

        Ok(tx)
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    fn transaction_exists(&self, reference_id: &str) -> Result<bool> {
        self.has_key(
            cf::TRANSACTIONS_BY_REFERENCE,
            &keys::reference_key(reference_id),
        )
    }

    fn get_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<CreditTransaction>> {
        let cf_by_ref = self.cf(cf::TRANSACTIONS_BY_REFERENCE)?;
        let Some(value) = self
            .db
            .get_cf(&cf_by_ref, keys::reference_key(reference_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let bytes = keys::decode_ulid_bytes(&value).ok_or_else(|| {
            StoreError::Serialization(format!("bad reference index entry: {reference_id}"))
        })?;
        self.get_transaction(&TransactionId::from_bytes(bytes))
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let mut transactions = Vec::new();

        // ULID keys sort oldest first; walk them backwards for newest first.
        for key in self.user_index_keys(user_id)?.iter().rev().skip(offset) {
            if transactions.len() >= limit {
                break;
            }

            let tx_id = keys::extract_transaction_id_from_user_key(key)
                .ok_or_else(|| StoreError::Serialization("bad user index key".into()))?;
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }

    fn count_transactions_by_user(&self, user_id: &UserId) -> Result<u64> {
        Ok(self.user_index_keys(user_id)?.len() as u64)
    }

    // =========================================================================
    // Reservation Operations
    // =========================================================================

    fn reserve(
        &self,
        user_id: &UserId,
        trade_id: &str,
        amount: i64,
        ttl: Duration,
    ) -> Result<PendingDebit> {
        ensure_positive(amount)?;
        let _user_guard = self.lock_user(user_id);
        let _ref_guard = self.lock_reference(Some(trade_id));
        self.ensure_unused(Some(trade_id))?;

        if self.has_key(cf::RESERVATIONS_BY_TRADE, &keys::trade_key(trade_id))? {
            return Err(StoreError::ReservationOpen {
                trade_id: trade_id.to_string(),
            });
        }

        let mut balance = self.load_balance(user_id)?;
        if !balance.can_spend(amount) {
            return Err(StoreError::InsufficientCredits {
                available: balance.spendable(),
                required: amount,
            });
        }
        balance.hold(amount);

        let hold = PendingDebit::new(*user_id, trade_id.to_string(), amount, ttl);
        let cf_reservations = self.cf(cf::RESERVATIONS)?;
        let cf_by_trade = self.cf(cf::RESERVATIONS_BY_TRADE)?;

        let mut batch = WriteBatch::default();
        self.stage_balance(&mut batch, &balance)?;
        batch.put_cf(
            &cf_reservations,
            keys::reservation_key(&hold.id),
            Self::serialize(&hold)?,
        );
        batch.put_cf(&cf_by_trade, keys::trade_key(trade_id), hold.id.to_bytes());
        self.write(batch)?;

        Ok(hold)
    }

    fn get_reservation(&self, reservation_id: &ReservationId) -> Result<Option<PendingDebit>> {
        self.get_value(cf::RESERVATIONS, &keys::reservation_key(reservation_id))
    }

    fn find_reservation_by_trade(&self, trade_id: &str) -> Result<Option<PendingDebit>> {
        let cf_by_trade = self.cf(cf::RESERVATIONS_BY_TRADE)?;
        let Some(value) = self
            .db
            .get_cf(&cf_by_trade, keys::trade_key(trade_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let bytes = keys::decode_ulid_bytes(&value).ok_or_else(|| {
            StoreError::Serialization(format!("bad trade index entry: {trade_id}"))
        })?;
        self.get_reservation(&ReservationId::from_bytes(bytes))
    }

    fn confirm_reservation(
        &self,
        reservation_id: &ReservationId,
        category: Category,
        description: &str,
    ) -> Result<CreditTransaction> {
        let (hold, tx) = self.settle_reservation(reservation_id, Some((category, description)))?;
        tx.ok_or_else(|| StoreError::Database(format!("reservation {} not charged", hold.id)))
    }

    fn release_reservation(&self, reservation_id: &ReservationId) -> Result<PendingDebit> {
        self.settle_reservation(reservation_id, None)
            .map(|(hold, _)| hold)
    }

    fn list_expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<PendingDebit>> {
        let cf_reservations = self.cf(cf::RESERVATIONS)?;
        let mut expired = Vec::new();

        for item in self.db.iterator_cf(&cf_reservations, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let hold: PendingDebit = Self::deserialize(&value)?;
            if hold.is_expired(now) {
                expired.push(hold);
            }
        }

        Ok(expired)
    }

    // =========================================================================
    // Compensation Queue Operations
    // =========================================================================

    fn put_compensation_task(&self, task: &CompensationTask) -> Result<()> {
        let cf_tasks = self.cf(cf::COMPENSATION_TASKS)?;
        let cf_pending = self.cf(cf::COMPENSATION_PENDING)?;
        let key = keys::task_key(&task.id);

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_tasks, &key, Self::serialize(task)?);
        if task.status == TaskStatus::Pending {
            batch.put_cf(&cf_pending, &key, b"");
        } else {
            batch.delete_cf(&cf_pending, &key);
        }
        self.write(batch)
    }

    fn get_compensation_task(&self, task_id: &TaskId) -> Result<Option<CompensationTask>> {
        self.get_value(cf::COMPENSATION_TASKS, &keys::task_key(task_id))
    }

    fn list_pending_compensation_tasks(&self) -> Result<Vec<CompensationTask>> {
        let cf_pending = self.cf(cf::COMPENSATION_PENDING)?;
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(&cf_pending, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            ids.push(key);
        }

        Ok(self
            .scan_tasks(Some(ids))?
            .into_iter()
            .filter(|task| task.status == TaskStatus::Pending)
            .collect())
    }

    fn list_compensation_tasks(
        &self,
        status: Option<TaskStatus>,
    ) -> Result<Vec<CompensationTask>> {
        Ok(self
            .scan_tasks(None)?
            .into_iter()
            .filter(|task| status.map_or(true, |s| task.status == s))
            .collect())
    }
}
