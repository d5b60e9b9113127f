//! Manual balance corrections.
//!
//! Adjustments skip the reservation protocol: they are single-step and tagged
//! `admin_adjust`, with the admin id, request IP and reason recorded in the
//! transaction description. Authorization is the caller's job.

use serde::Deserialize;

use credit_ledger_core::{CreditTransaction, LedgerError, Result, UserId};

use crate::ledger::Ledger;

/// Longest accepted reason, in characters.
pub const MAX_REASON_LEN: usize = 500;

/// IP recorded when the request carried none.
pub const UNKNOWN_IP: &str = "unknown";

/// A requested manual adjustment.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminAdjustment {
    /// Initiating admin.
    pub admin_id: String,
    /// Affected user.
    pub user_id: UserId,
    /// Signed credit change; positive credits, negative debits.
    pub delta: i64,
    /// Why the adjustment was made.
    pub reason: String,
    /// Request origin.
    #[serde(default)]
    pub ip_address: String,
}

impl AdminAdjustment {
    /// Check the request and normalize its text fields.
    pub fn validate(mut self) -> Result<Self> {
        self.admin_id = self.admin_id.trim().to_string();
        if self.admin_id.is_empty() {
            return Err(LedgerError::Validation("admin id is required".into()));
        }
        if self.delta == 0 {
            return Err(LedgerError::Validation("delta must not be zero".into()));
        }

        self.reason = self.reason.trim().to_string();
        if self.reason.is_empty() {
            return Err(LedgerError::Validation("reason is required".into()));
        }
        if self.reason.chars().count() > MAX_REASON_LEN {
            return Err(LedgerError::Validation(format!(
                "reason must be at most {MAX_REASON_LEN} characters"
            )));
        }

        self.ip_address = self.ip_address.trim().to_string();
        if self.ip_address.is_empty() {
            self.ip_address = UNKNOWN_IP.to_string();
        }
        Ok(self)
    }
}

/// Validate and apply an adjustment.
pub async fn adjust_credits(ledger: &Ledger, request: AdminAdjustment) -> Result<CreditTransaction> {
    let request = request.validate().map_err(|e| {
        tracing::warn!(error = %e, "Rejected admin adjustment");
        e
    })?;

    ledger
        .adjust_balance(
            &request.admin_id,
            request.user_id,
            request.delta,
            &request.reason,
            &request.ip_address,
        )
        .await
}
