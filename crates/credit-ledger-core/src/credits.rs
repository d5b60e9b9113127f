//! Credit transaction types.
//!
//! Every change to a balance appends exactly one [`CreditTransaction`]. Records
//! are never mutated or deleted after they are written.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// A single ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Direction of the balance change.
    #[serde(rename = "type")]
    pub kind: TransactionKind,

    /// Amount moved, always positive.
    pub amount: i64,

    /// `available_credits` before the change.
    pub balance_before: i64,

    /// `available_credits` after the change.
    pub balance_after: i64,

    /// What the change was for.
    pub category: Category,

    /// Human-readable description.
    pub description: String,

    /// Caller-supplied idempotency key (e.g. a trade identifier).
    pub reference_id: Option<String>,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Build a credit entry against a balance of `balance_before`.
    #[must_use]
    pub fn credit(
        user_id: UserId,
        amount: i64,
        balance_before: i64,
        category: Category,
        description: String,
        reference_id: Option<String>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            kind: TransactionKind::Credit,
            amount,
            balance_before,
            balance_after: balance_before + amount,
            category,
            description,
            reference_id,
            created_at: Utc::now(),
        }
    }

    /// Build a debit entry against a balance of `balance_before`.
    #[must_use]
    pub fn debit(
        user_id: UserId,
        amount: i64,
        balance_before: i64,
        category: Category,
        description: String,
        reference_id: Option<String>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            kind: TransactionKind::Debit,
            amount,
            balance_before,
            balance_after: balance_before - amount,
            category,
            description,
            reference_id,
            created_at: Utc::now(),
        }
    }

    /// Signed balance change (positive for credits).
    #[must_use]
    pub const fn signed_amount(&self) -> i64 {
        match self.kind {
            TransactionKind::Credit => self.amount,
            TransactionKind::Debit => -self.amount,
        }
    }
}

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Credits added.
    Credit,
    /// Credits removed.
    Debit,
}

/// Tag describing why a balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Credits bought through a package purchase.
    Purchase,

    /// One billable trading decision.
    Trade,

    /// Manual correction by an operator.
    AdminAdjust,

    /// Credits returned to the user.
    Refund,

    /// Promotional credits.
    Bonus,
}

impl Category {
    /// The stable lowercase tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Trade => "trade",
            Self::AdminAdjust => "admin_adjust",
            Self::Refund => "refund",
            Self::Bonus => "bonus",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(Self::Purchase),
            "trade" => Ok(Self::Trade),
            "admin_adjust" => Ok(Self::AdminAdjust),
            "refund" => Ok(Self::Refund),
            "bonus" => Ok(Self::Bonus),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_entry_balances() {
        let tx = CreditTransaction::credit(
            UserId::generate(),
            500,
            100,
            Category::Purchase,
            "package".into(),
            None,
        );
        assert_eq!(tx.kind, TransactionKind::Credit);
        assert_eq!(tx.balance_after, 600);
        assert_eq!(tx.signed_amount(), 500);
    }

    #[test]
    fn debit_entry_balances() {
        let tx = CreditTransaction::debit(
            UserId::generate(),
            1,
            600,
            Category::Trade,
            "trade".into(),
            Some("trade-1".into()),
        );
        assert_eq!(tx.balance_after, 599);
        assert_eq!(tx.signed_amount(), -1);
        assert_eq!(tx.reference_id.as_deref(), Some("trade-1"));
    }

    #[test]
    fn category_tags() {
        assert_eq!(Category::AdminAdjust.to_string(), "admin_adjust");
        assert_eq!("trade".parse::<Category>(), Ok(Category::Trade));
        assert!("subscription".parse::<Category>().is_err());

        let json = serde_json::to_string(&Category::AdminAdjust).unwrap();
        assert_eq!(json, "\"admin_adjust\"");
    }

    #[test]
    fn kind_serializes_as_type() {
        let tx = CreditTransaction::debit(
            UserId::generate(),
            3,
            10,
            Category::Refund,
            String::new(),
            None,
        );
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["type"], "debit");
        assert_eq!(value["category"], "refund");
    }
}
