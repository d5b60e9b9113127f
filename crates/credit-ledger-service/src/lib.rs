//! Credit ledger service.
//!
//! This crate wraps a [`credit_ledger_store::Store`] with the pieces that
//! reason about partial failure:
//!
//! - [`Ledger`] - async facade with bounded storage calls
//! - [`Reservation`] - the `Reserve` → `Confirm` | `Release` handle
//! - [`CompensationService`] - background loop finishing deferred debits
//! - [`admin`] - validated, audited manual adjustments
//!
//! plus a thin HTTP surface (query, grant and admin routes).
//!
//! # Authentication
//!
//! The HTTP surface supports two authentication methods:
//!
//! 1. **Bearer tokens** - For end-user requests (`Bearer test-token:<uuid>`)
//! 2. **Service API keys** - For service-to-service and admin requests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Health handler needs async for routing

pub mod admin;
pub mod auth;
pub mod compensation;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod reservation;
pub mod routes;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use admin::AdminAdjustment;
pub use compensation::{CompensationHandle, CompensationService, TickReport};
pub use config::ServiceConfig;
pub use error::ApiError;
pub use ledger::Ledger;
pub use reservation::{ConfirmOutcome, Reservation};
pub use routes::create_router;
pub use state::AppState;
