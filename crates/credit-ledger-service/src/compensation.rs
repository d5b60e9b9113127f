//! Compensation loop.
//!
//! Each tick drives every pending [`CompensationTask`] one step:
//!
//! 1. if a transaction with the task's `trade_id` exists, mark it complete;
//! 2. otherwise confirm the trade's open hold, or debit directly when the hold
//!    is gone, with `reference_id = trade_id`;
//! 3. on failure bump `retry_count`; at `max_retries` the task is failed.
//!
//! After the queue, holds past their TTL are released unless a pending task
//! still references their trade.

use std::collections::HashSet;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use credit_ledger_core::{Category, CompensationTask, LedgerError, Result, TaskStatus};

use crate::ledger::Ledger;

/// Shortest interval the loop will tick at.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Counts from one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks whose debit is now on the ledger.
    pub completed: usize,
    /// Tasks that failed and stay pending.
    pub retried: usize,
    /// Tasks that exhausted their retry budget this tick.
    pub failed: usize,
    /// Expired holds released.
    pub expired_released: usize,
}

/// Background retry loop for deferred trade debits.
#[derive(Debug, Clone)]
pub struct CompensationService {
    ledger: Ledger,
    interval: Duration,
}

/// Handle to a running [`CompensationService`].
#[derive(Debug)]
pub struct CompensationHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CompensationHandle {
    /// Signal the loop to stop and wait for the current tick to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Compensation loop panicked");
        }
    }

    /// The token the loop watches.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

enum Outcome {
    Completed,
    Retried,
    Failed,
}

impl CompensationService {
    /// Create a service ticking at the ledger's configured interval.
    #[must_use]
    pub fn new(ledger: Ledger) -> Self {
        let interval = ledger.config().compensation_interval();
        Self {
            ledger,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Override the tick interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Spawn the loop on the current runtime.
    pub fn start(self) -> CompensationHandle {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.run(cancel.clone()));
        CompensationHandle { cancel, handle }
    }

    /// Tick until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(interval = ?self.interval, "Compensation loop started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) if report != TickReport::default() => {
                            tracing::info!(
                                completed = report.completed,
                                retried = report.retried,
                                failed = report.failed,
                                expired_released = report.expired_released,
                                "Compensation tick"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "Compensation tick failed"),
                    }
                }
            }
        }

        tracing::info!("Compensation loop stopped");
    }

    /// Run one pass over the queue and the expired holds.
    pub async fn tick(&self) -> Result<TickReport> {
        let mut report = TickReport::default();
        let mut still_pending = HashSet::new();

        for task in self.ledger.pending_compensation_tasks().await? {
            let trade_id = task.trade_id.clone();
            match self.process(task).await {
                Outcome::Completed => report.completed += 1,
                Outcome::Retried => {
                    report.retried += 1;
                    still_pending.insert(trade_id);
                }
                Outcome::Failed => report.failed += 1,
            }
        }

        report.expired_released = self.release_expired(&still_pending).await?;
        Ok(report)
    }

    async fn process(&self, mut task: CompensationTask) -> Outcome {
        let outcome = match self.settle(&task).await {
            Ok(()) => {
                task.mark_complete();
                tracing::info!(
                    task_id = %task.id,
                    trade_id = %task.trade_id,
                    user_id = %task.user_id,
                    "Compensation task complete"
                );
                Outcome::Completed
            }
            Err(e) => {
                if task.record_failure(e.to_string()) {
                    tracing::error!(
                        task_id = %task.id,
                        trade_id = %task.trade_id,
                        user_id = %task.user_id,
                        retry_count = task.retry_count,
                        error = %e,
                        "Compensation task failed permanently"
                    );
                    Outcome::Failed
                } else {
                    tracing::warn!(
                        task_id = %task.id,
                        trade_id = %task.trade_id,
                        retry_count = task.retry_count,
                        max_retries = task.max_retries,
                        error = %e,
                        "Compensation attempt failed"
                    );
                    Outcome::Retried
                }
            }
        };

        let task_id = task.id;
        if let Err(e) = self.ledger.save_task(task).await {
            tracing::error!(task_id = %task_id, error = %e, "Could not persist compensation task");
        }
        outcome
    }

    /// Make sure the task's debit is on the ledger exactly once.
    async fn settle(&self, task: &CompensationTask) -> Result<()> {
        if self.ledger.transaction_exists(&task.trade_id).await? {
            tracing::debug!(trade_id = %task.trade_id, "Trade already charged");
            return Ok(());
        }

        let description = task.details().describe();
        let charged = match self.ledger.find_hold_by_trade(&task.trade_id).await? {
            Some(hold) => match self.ledger.confirm_hold(hold.id, description.clone()).await {
                Err(LedgerError::NotFound(_)) => self.debit(task, description).await,
                other => other,
            },
            None => self.debit(task, description).await,
        };

        match charged {
            // Raced with a late direct confirm.
            Ok(_) | Err(LedgerError::AlreadyProcessed { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn debit(
        &self,
        task: &CompensationTask,
        description: String,
    ) -> Result<credit_ledger_core::CreditTransaction> {
        self.ledger
            .debit(
                task.user_id,
                task.amount,
                Category::Trade,
                description,
                Some(task.trade_id.clone()),
            )
            .await
    }

    async fn release_expired(&self, pending_trades: &HashSet<String>) -> Result<usize> {
        let mut released = 0;

        for hold in self.ledger.expired_holds().await? {
            if pending_trades.contains(&hold.trade_id) {
                continue;
            }
            match self.ledger.release_hold(hold.id).await {
                Ok(_) => {
                    released += 1;
                    tracing::warn!(
                        reservation_id = %hold.id,
                        user_id = %hold.user_id,
                        trade_id = %hold.trade_id,
                        amount = hold.amount,
                        "Released expired reservation"
                    );
                }
                // Confirmed or released concurrently.
                Err(LedgerError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(reservation_id = %hold.id, error = %e, "Could not release expired reservation");
                }
            }
        }

        Ok(released)
    }

    /// Tasks in a status, for operators.
    pub async fn tasks(&self, status: Option<TaskStatus>) -> Result<Vec<CompensationTask>> {
        self.ledger.list_compensation_tasks(status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use credit_ledger_core::{LedgerConfig, TradeDetails, UserId};

    use crate::testing::{ledger_with_balance, ledger_with_config, FlakyStore};

    fn details() -> TradeDetails {
        TradeDetails::new("BTCUSDT", "open_long", "trader-1")
    }

    #[tokio::test]
    async fn existing_charge_completes_without_second_debit() {
        let (ledger, user_id) = ledger_with_balance(5).await;
        ledger
            .debit(user_id, 1, Category::Trade, "trade", Some("trade-1".into()))
            .await
            .unwrap();
        let task = ledger
            .enqueue_compensation(user_id, "trade-1", 1, details())
            .await
            .unwrap();

        let report = CompensationService::new(ledger.clone()).tick().await.unwrap();
        assert_eq!(report.completed, 1);

        let (_, count) = ledger.get_transactions(user_id, None, None).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(ledger.get_balance(user_id).await.unwrap().available, 4);

        let stored = ledger
            .list_compensation_tasks(Some(TaskStatus::Complete))
            .await
            .unwrap();
        assert_eq!(stored[0].id, task.id);
    }

    #[tokio::test]
    async fn open_hold_is_confirmed_not_double_counted() {
        let store = Arc::new(FlakyStore::new());
        let ledger = Ledger::new(store.clone(), LedgerConfig::default());
        let user_id = UserId::generate();
        ledger
            .credit(user_id, 1, Category::Purchase, "seed", None)
            .await
            .unwrap();

        let mut reservation = ledger.reserve(user_id, "trade-1").await.unwrap();
        store.fail_charges(true);
        reservation
            .confirm_or_defer("BTCUSDT", "open_long", "trader-1")
            .await
            .unwrap();
        store.fail_charges(false);

        let report = CompensationService::new(ledger.clone()).tick().await.unwrap();
        assert_eq!(report.completed, 1);

        let balance = ledger.get_or_create_balance(user_id).await.unwrap();
        assert_eq!(balance.available_credits, 0);
        assert_eq!(balance.reserved_credits, 0);
        assert!(balance.is_consistent());
        assert!(ledger.transaction_exists("trade-1").await.unwrap());
    }

    #[tokio::test]
    async fn missing_hold_debits_directly() {
        let (ledger, user_id) = ledger_with_balance(3).await;
        ledger
            .enqueue_compensation(user_id, "trade-9", 1, details())
            .await
            .unwrap();

        let report = CompensationService::new(ledger.clone()).tick().await.unwrap();
        assert_eq!(report.completed, 1);

        let tx = ledger.transaction_by_reference("trade-9").await.unwrap().unwrap();
        assert_eq!(tx.category, Category::Trade);
        assert!(tx.description.contains("trader-1"));
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let (ledger, user_id) = ledger_with_balance(0).await;
        let task = ledger
            .enqueue_compensation(user_id, "trade-1", 1, details())
            .await
            .unwrap();
        let service = CompensationService::new(ledger.clone());

        for _ in 0..2 {
            assert_eq!(service.tick().await.unwrap().retried, 1);
        }
        assert_eq!(service.tick().await.unwrap().failed, 1);

        // Fourth tick leaves the task alone.
        assert_eq!(service.tick().await.unwrap(), TickReport::default());

        let failed = service.tasks(Some(TaskStatus::Failed)).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, task.id);
        assert_eq!(failed[0].retry_count, 3);
        assert!(failed[0]
            .last_error
            .as_deref()
            .unwrap()
            .contains("insufficient credits"));
    }

    #[tokio::test]
    async fn expired_holds_are_released() {
        let config = LedgerConfig {
            reservation_ttl_secs: 0,
            ..LedgerConfig::default()
        };
        let (ledger, user_id) = ledger_with_config(2, config).await;

        let orphan = ledger.reserve(user_id, "trade-orphan").await.unwrap();
        drop(orphan);

        let report = CompensationService::new(ledger.clone()).tick().await.unwrap();
        assert_eq!(report.expired_released, 1);

        let balance = ledger.get_or_create_balance(user_id).await.unwrap();
        assert_eq!(balance.reserved_credits, 0);
        assert_eq!(balance.available_credits, 2);
    }

    #[tokio::test]
    async fn expired_hold_with_pending_task_is_kept() {
        let store = Arc::new(FlakyStore::new());
        let config = LedgerConfig {
            reservation_ttl_secs: 0,
            ..LedgerConfig::default()
        };
        let ledger = Ledger::new(store.clone(), config);
        let user_id = UserId::generate();
        ledger
            .credit(user_id, 1, Category::Purchase, "seed", None)
            .await
            .unwrap();

        let mut reservation = ledger.reserve(user_id, "trade-1").await.unwrap();
        store.fail_charges(true);
        reservation
            .confirm_or_defer("BTCUSDT", "buy", "trader-1")
            .await
            .unwrap();

        let report = CompensationService::new(ledger.clone()).tick().await.unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(report.expired_released, 0);
        assert!(ledger.find_hold_by_trade("trade-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn start_and_stop() {
        let (ledger, user_id) = ledger_with_balance(1).await;
        ledger
            .enqueue_compensation(user_id, "trade-1", 1, details())
            .await
            .unwrap();

        let handle = CompensationService::new(ledger.clone())
            .with_interval(Duration::from_millis(10))
            .start();

        for _ in 0..100 {
            if ledger.transaction_exists("trade-1").await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.stop().await;

        assert!(ledger.transaction_exists("trade-1").await.unwrap());
    }
}
