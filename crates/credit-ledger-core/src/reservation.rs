//! Durable reservation intents.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{ReservationId, UserId};

/// A credit hold placed by `Reserve` and consumed by `Confirm` or `Release`.
///
/// The record only lives while the reservation is open; confirmed, released and
/// expired holds are removed from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDebit {
    /// Reservation identifier.
    pub id: ReservationId,

    /// The user whose credits are held.
    pub user_id: UserId,

    /// Idempotency key of the billable action.
    pub trade_id: String,

    /// Credits held.
    pub amount: i64,

    /// When the hold was placed.
    pub created_at: DateTime<Utc>,

    /// After this instant the hold may be reclaimed.
    pub expires_at: DateTime<Utc>,
}

impl PendingDebit {
    /// Create a hold that expires `ttl` from now.
    #[must_use]
    pub fn new(user_id: UserId, trade_id: String, amount: i64, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: ReservationId::generate(),
            user_id,
            trade_id,
            amount,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Whether the hold has outlived its TTL at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Lifecycle of a reservation handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    /// Credit is held, outcome undecided.
    Created,
    /// The debit was written.
    Confirmed,
    /// The hold was dropped without charging.
    Released,
}

impl ReservationState {
    /// Confirmed and Released are final.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Created)
    }
}
