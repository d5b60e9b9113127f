//! Credit balance, history and grant handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use credit_ledger_core::{
    BalanceView, Category, CreditSummary, CreditTransaction, LedgerError, UserId,
};

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Get current credit balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceView>, ApiError> {
    Ok(Json(state.ledger.get_balance(auth.user_id).await?))
}

/// Get balance figures plus the number of transactions.
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<CreditSummary>, ApiError> {
    Ok(Json(state.ledger.get_summary(auth.user_id).await?))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// 1-based page number (default: 1).
    pub page: Option<usize>,
    /// Page size (default: 20, max: 100).
    pub limit: Option<usize>,
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// `credit` or `debit`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Amount moved (always positive).
    pub amount: i64,
    /// Balance before this transaction.
    pub balance_before: i64,
    /// Balance after this transaction.
    pub balance_after: i64,
    /// Category tag.
    pub category: String,
    /// Description.
    pub description: String,
    /// Idempotency key, if any.
    pub reference_id: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<&CreditTransaction> for TransactionResponse {
    fn from(tx: &CreditTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            kind: format!("{:?}", tx.kind).to_lowercase(),
            amount: tx.amount,
            balance_before: tx.balance_before,
            balance_after: tx.balance_after,
            category: tx.category.to_string(),
            description: tx.description.clone(),
            reference_id: tx.reference_id.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Total transactions for the user.
    pub total: u64,
    /// Page returned.
    pub page: usize,
    /// Page size applied.
    pub limit: usize,
}

/// List transaction history.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(credit_ledger_core::DEFAULT_PAGE_LIMIT)
        .clamp(1, credit_ledger_core::MAX_PAGE_LIMIT);

    let (transactions, total) = state
        .ledger
        .get_transactions(auth.user_id, Some(page), Some(limit))
        .await?;

    Ok(Json(ListTransactionsResponse {
        transactions: transactions.iter().map(TransactionResponse::from).collect(),
        total,
        page,
        limit,
    }))
}

/// Grant request from services.
#[derive(Debug, Deserialize)]
pub struct GrantCreditsRequest {
    /// User to credit.
    pub user_id: String,
    /// Credits to add.
    pub amount: i64,
    /// One of `purchase`, `bonus`, `refund` (default: `purchase`).
    #[serde(default)]
    pub category: Option<String>,
    /// Description (optional).
    #[serde(default)]
    pub description: Option<String>,
    /// Idempotency key, e.g. an order id.
    #[serde(default)]
    pub reference_id: Option<String>,
}

/// Grant response.
#[derive(Debug, Serialize)]
pub struct GrantCreditsResponse {
    /// `true` if this reference had been granted before; nothing changed.
    pub already_processed: bool,
    /// The transaction recorded for the grant.
    pub transaction: TransactionResponse,
    /// Balance after the grant.
    pub balance: BalanceView,
}

/// Add credits to a user.
pub async fn grant_credits(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<GrantCreditsRequest>,
) -> Result<Json<GrantCreditsResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let category = parse_grant_category(body.category.as_deref())?;
    let description = body
        .description
        .unwrap_or_else(|| format!("{category} credits"));

    tracing::debug!(
        service = %auth.service_name,
        user_id = %user_id,
        amount = body.amount,
        reference_id = ?body.reference_id,
        "Processing credit grant"
    );

    let result = state
        .ledger
        .credit(
            user_id,
            body.amount,
            category,
            description,
            body.reference_id.clone(),
        )
        .await;

    let (already_processed, transaction) = match result {
        Ok(tx) => (false, tx),
        Err(LedgerError::AlreadyProcessed { reference_id }) => {
            let tx = state
                .ledger
                .transaction_by_reference(&reference_id)
                .await?
                .ok_or_else(|| {
                    ApiError::Internal(format!("reference {reference_id} has no transaction"))
                })?;
            if tx.user_id != user_id {
                return Err(ApiError::AlreadyProcessed(reference_id));
            }
            (true, tx)
        }
        Err(e) => return Err(e.into()),
    };

    let balance = state.ledger.get_balance(user_id).await?;

    Ok(Json(GrantCreditsResponse {
        already_processed,
        transaction: TransactionResponse::from(&transaction),
        balance,
    }))
}

fn parse_grant_category(raw: Option<&str>) -> Result<Category, ApiError> {
    let category = match raw {
        None => Category::Purchase,
        Some(s) => s.parse::<Category>().map_err(ApiError::BadRequest)?,
    };

    match category {
        Category::Purchase | Category::Bonus | Category::Refund => Ok(category),
        other => Err(ApiError::BadRequest(format!(
            "category {other} cannot be granted"
        ))),
    }
}
