//! Admin handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use credit_ledger_core::{BalanceView, CompensationTask, TaskStatus, UserId};

use crate::admin::{self, AdminAdjustment};
use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::handlers::credits::TransactionResponse;
use crate::state::AppState;

/// Adjustment request body. Admin id and IP come from the request headers.
#[derive(Debug, Deserialize)]
pub struct AdjustCreditsRequest {
    /// Affected user.
    pub user_id: String,
    /// Signed credit change.
    pub delta: i64,
    /// Why the adjustment was made.
    pub reason: String,
}

/// Adjustment response.
#[derive(Debug, Serialize)]
pub struct AdjustCreditsResponse {
    /// The audit transaction.
    pub transaction: TransactionResponse,
    /// Balance after the adjustment.
    pub balance: BalanceView,
}

/// Apply a manual adjustment.
pub async fn adjust_credits(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(body): Json<AdjustCreditsRequest>,
) -> Result<Json<AdjustCreditsResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let request = AdminAdjustment {
        admin_id: auth.admin_id,
        user_id,
        delta: body.delta,
        reason: body.reason,
        ip_address: auth.ip_address,
    };

    let tx = admin::adjust_credits(&state.ledger, request).await?;
    let balance = state.ledger.get_balance(user_id).await?;

    Ok(Json(AdjustCreditsResponse {
        transaction: TransactionResponse::from(&tx),
        balance,
    }))
}

/// Compensation list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListCompensationQuery {
    /// `pending`, `complete` or `failed` (default: all).
    pub status: Option<String>,
}

/// Compensation list response.
#[derive(Debug, Serialize)]
pub struct ListCompensationResponse {
    /// Matching tasks, oldest first.
    pub tasks: Vec<CompensationTask>,
}

/// List compensation tasks.
pub async fn list_compensation_tasks(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Query(query): Query<ListCompensationQuery>,
) -> Result<Json<ListCompensationResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<TaskStatus>())
        .transpose()
        .map_err(ApiError::BadRequest)?;

    tracing::debug!(admin_id = %auth.admin_id, status = ?status, "Listing compensation tasks");

    let tasks = state.ledger.list_compensation_tasks(status).await?;
    Ok(Json(ListCompensationResponse { tasks }))
}
