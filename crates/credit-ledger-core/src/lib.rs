//! Core types for the credit ledger.
//!
//! This crate provides the foundational types shared by the store and the
//! service:
//!
//! - **Identifiers**: `UserId`, `TransactionId`, `ReservationId`, `TaskId`
//! - **Balances**: `UserCredits`, `BalanceView`, `CreditSummary`
//! - **Transactions**: `CreditTransaction`, `TransactionKind`, `Category`
//! - **Reservations**: `PendingDebit`, `ReservationState`
//! - **Compensation**: `CompensationTask`, `TaskStatus`, `TradeDetails`
//! - **Configuration**: `LedgerConfig`
//!
//! # Credit unit
//!
//! Credits are whole units stored as `i64`. One billable action (an AI trading
//! decision) costs `LedgerConfig::credit_cost_per_action`, one credit by default.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod balance;
pub mod compensation;
pub mod config;
pub mod credits;
pub mod error;
pub mod ids;
pub mod reservation;

pub use balance::{BalanceView, CreditSummary, UserCredits};
pub use compensation::{CompensationTask, TaskStatus, TradeDetails};
pub use config::{LedgerConfig, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use credits::{Category, CreditTransaction, TransactionKind};
pub use error::{LedgerError, Result};
pub use ids::{IdError, ReservationId, TaskId, TransactionId, UserId};
pub use reservation::{PendingDebit, ReservationState};
