//! The two-phase reservation handle.
//!
//! A [`Reservation`] is obtained from [`Ledger::reserve`], owned by the task
//! that performs the billable action, and finished exactly once with
//! [`Reservation::confirm`] or [`Reservation::release`]. Both take `&mut self`
//! and report `AlreadyConfirmed` / `AlreadyReleased` on a second call.

use credit_ledger_core::{
    Category, LedgerError, PendingDebit, ReservationId, ReservationState, Result, TaskId,
    TradeDetails, UserId,
};

use crate::ledger::Ledger;

/// Result of [`Reservation::confirm_or_defer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The debit was written synchronously.
    Confirmed,
    /// Storage was unavailable; the debit was handed to the compensation loop.
    Deferred(TaskId),
}

/// One held unit of credit awaiting confirmation or release.
#[must_use = "a reservation holds credits until confirmed or released"]
pub struct Reservation {
    ledger: Ledger,
    user_id: UserId,
    trade_id: String,
    amount: i64,
    hold: Option<PendingDebit>,
    state: ReservationState,
    already_processed: bool,
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("user_id", &self.user_id)
            .field("trade_id", &self.trade_id)
            .field("amount", &self.amount)
            .field("state", &self.state)
            .field("already_processed", &self.already_processed)
            .finish_non_exhaustive()
    }
}

impl Reservation {
    pub(crate) fn created(ledger: Ledger, hold: PendingDebit) -> Self {
        Self {
            ledger,
            user_id: hold.user_id,
            trade_id: hold.trade_id.clone(),
            amount: hold.amount,
            hold: Some(hold),
            state: ReservationState::Created,
            already_processed: false,
        }
    }

    pub(crate) fn already_processed(
        ledger: Ledger,
        user_id: UserId,
        trade_id: String,
        amount: i64,
    ) -> Self {
        Self {
            ledger,
            user_id,
            trade_id,
            amount,
            hold: None,
            state: ReservationState::Confirmed,
            already_processed: true,
        }
    }

    /// The charged user.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The idempotency key.
    #[must_use]
    pub fn trade_id(&self) -> &str {
        &self.trade_id
    }

    /// Credits held.
    #[must_use]
    pub const fn amount(&self) -> i64 {
        self.amount
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> ReservationState {
        self.state
    }

    /// `true` when the trade had been charged before `reserve` was called.
    #[must_use]
    pub const fn is_already_processed(&self) -> bool {
        self.already_processed
    }

    /// The durable hold backing this handle, while it is open.
    #[must_use]
    pub fn reservation_id(&self) -> Option<ReservationId> {
        self.hold.as_ref().map(|hold| hold.id)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            ReservationState::Created => Ok(()),
            ReservationState::Confirmed => Err(LedgerError::AlreadyConfirmed),
            ReservationState::Released => Err(LedgerError::AlreadyReleased),
        }
    }

    /// Write the trade debit with `reference_id = trade_id`.
    ///
    /// Call only after the billable action succeeded. On a retryable error the
    /// handle stays open and the hold stays in place.
    pub async fn confirm(&mut self, symbol: &str, action: &str, trader_id: &str) -> Result<()> {
        self.ensure_open()?;
        let details = TradeDetails::new(symbol, action, trader_id);
        let description = details.describe();

        let result = match &self.hold {
            Some(hold) => match self.ledger.confirm_hold(hold.id, description.clone()).await {
                // The hold was reclaimed after its TTL; charge directly.
                Err(LedgerError::NotFound(_)) => self.debit_directly(description).await,
                other => other,
            },
            None => self.debit_directly(description).await,
        };

        match result {
            Ok(tx) => {
                tracing::info!(
                    user_id = %self.user_id,
                    trade_id = %self.trade_id,
                    transaction_id = %tx.id,
                    symbol = %details.symbol,
                    action = %details.action,
                    "Reservation confirmed"
                );
            }
            Err(LedgerError::AlreadyProcessed { .. }) => {
                tracing::info!(
                    user_id = %self.user_id,
                    trade_id = %self.trade_id,
                    "Trade already charged elsewhere"
                );
            }
            Err(e) => return Err(e),
        }

        self.hold = None;
        self.state = ReservationState::Confirmed;
        Ok(())
    }

    async fn debit_directly(
        &self,
        description: String,
    ) -> Result<credit_ledger_core::CreditTransaction> {
        self.ledger
            .debit(
                self.user_id,
                self.amount,
                Category::Trade,
                description,
                Some(self.trade_id.clone()),
            )
            .await
    }

    /// Confirm, or hand the debit to the compensation loop if storage is
    /// unavailable.
    ///
    /// A deferred handle counts as confirmed: the hold stays in place and is
    /// consumed by the compensation task.
    pub async fn confirm_or_defer(
        &mut self,
        symbol: &str,
        action: &str,
        trader_id: &str,
    ) -> Result<ConfirmOutcome> {
        match self.confirm(symbol, action, trader_id).await {
            Ok(()) => Ok(ConfirmOutcome::Confirmed),
            Err(e) if e.is_retryable() => {
                let details = TradeDetails::new(symbol, action, trader_id);
                let task = self
                    .ledger
                    .enqueue_compensation(self.user_id, &self.trade_id, self.amount, details)
                    .await
                    .map_err(|enqueue_err| {
                        tracing::error!(
                            user_id = %self.user_id,
                            trade_id = %self.trade_id,
                            confirm_error = %e,
                            error = %enqueue_err,
                            "Could not confirm or defer trade debit"
                        );
                        enqueue_err
                    })?;

                self.hold = None;
                self.state = ReservationState::Confirmed;
                Ok(ConfirmOutcome::Deferred(task.id))
            }
            Err(e) => Err(e),
        }
    }

    /// Drop the hold without charging.
    pub async fn release(&mut self) -> Result<()> {
        self.ensure_open()?;

        if let Some(hold) = &self.hold {
            match self.ledger.release_hold(hold.id).await {
                // Already reclaimed by expiry.
                Ok(_) | Err(LedgerError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(
            user_id = %self.user_id,
            trade_id = %self.trade_id,
            "Reservation released"
        );
        self.hold = None;
        self.state = ReservationState::Released;
        Ok(())
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.state == ReservationState::Created && !std::thread::panicking() {
            tracing::warn!(
                user_id = %self.user_id,
                trade_id = %self.trade_id,
                expires_at = ?self.hold.as_ref().map(|hold| hold.expires_at),
                "Reservation dropped while open; credits stay held until it expires"
            );
        }
    }
}
