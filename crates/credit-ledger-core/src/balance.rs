//! Per-user credit balances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// The credit balance row for a single user.
///
/// `available_credits` always equals `total_credits - used_credits`.
/// `reserved_credits` counts credits held by open reservations; they are still
/// part of `available_credits` until the reservation is confirmed, but cannot be
/// spent by anyone else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredits {
    /// The owning user.
    pub user_id: UserId,

    /// Credits currently on the balance.
    pub available_credits: i64,

    /// Lifetime credits granted.
    pub total_credits: i64,

    /// Lifetime credits consumed.
    pub used_credits: i64,

    /// Credits held by pending debits.
    #[serde(default)]
    pub reserved_credits: i64,

    /// When the row was first created.
    pub created_at: DateTime<Utc>,

    /// When the row was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl UserCredits {
    /// Create an empty balance for a user.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            available_credits: 0,
            total_credits: 0,
            used_credits: 0,
            reserved_credits: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Credits that can still be reserved or debited.
    #[must_use]
    pub const fn spendable(&self) -> i64 {
        self.available_credits - self.reserved_credits
    }

    /// Check if `amount` can be taken without touching held credits.
    #[must_use]
    pub const fn can_spend(&self, amount: i64) -> bool {
        self.spendable() >= amount
    }

    /// Check the `available = total - used` invariant.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.available_credits == self.total_credits - self.used_credits
            && self.available_credits >= 0
            && self.reserved_credits >= 0
            && self.reserved_credits <= self.available_credits
    }

    /// Add credits to the balance.
    pub fn apply_credit(&mut self, amount: i64) {
        self.available_credits += amount;
        self.total_credits += amount;
        self.updated_at = Utc::now();
    }

    /// Remove credits from the balance. Callers check `can_spend` first.
    pub fn apply_debit(&mut self, amount: i64) {
        self.available_credits -= amount;
        self.used_credits += amount;
        self.updated_at = Utc::now();
    }

    /// Hold credits for a pending debit.
    pub fn hold(&mut self, amount: i64) {
        self.reserved_credits += amount;
        self.updated_at = Utc::now();
    }

    /// Drop a hold placed by [`UserCredits::hold`].
    pub fn unhold(&mut self, amount: i64) {
        self.reserved_credits = (self.reserved_credits - amount).max(0);
        self.updated_at = Utc::now();
    }
}

/// Read-only balance view returned by the query surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    /// Credits on the balance.
    pub available: i64,
    /// Lifetime granted.
    pub total: i64,
    /// Lifetime consumed.
    pub used: i64,
}

impl From<&UserCredits> for BalanceView {
    fn from(credits: &UserCredits) -> Self {
        Self {
            available: credits.available_credits,
            total: credits.total_credits,
            used: credits.used_credits,
        }
    }
}

/// Aggregate view over a user's balance and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditSummary {
    /// Lifetime granted.
    pub total: i64,
    /// Credits on the balance.
    pub available: i64,
    /// Lifetime consumed.
    pub used: i64,
    /// Number of ledger entries for the user.
    pub transaction_count: u64,
}
