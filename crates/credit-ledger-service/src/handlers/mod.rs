//! API handlers.

pub mod admin;
pub mod credits;
pub mod health;
