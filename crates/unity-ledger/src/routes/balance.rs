// Balance routes: GET /tokens/balance and the transaction history view.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use unity_ledger_core::db::models::LedgerTransaction;
use unity_ledger_core::error::ApiError;

use crate::context::LedgerContext;
use crate::ledger;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
}

/// Handle GET /tokens/balance.
pub async fn handle_get_balance(
    ctx: Arc<LedgerContext>,
    user_id: &str,
) -> Result<BalanceResponse, ApiError> {
    let balance = ledger::get_balance(&ctx, user_id)
        .await
        .map_err(|e| e.to_api_error())?;
    Ok(BalanceResponse {
        user_id: balance.user_id,
        balance: balance.balance,
        total_earned: balance.total_earned,
        total_spent: balance.total_spent,
    })
}

/// Pagination query for the history view.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// Transaction history response.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub transactions: Vec<LedgerTransaction>,
}

/// Handle GET /tokens/history.
pub async fn handle_history(
    ctx: Arc<LedgerContext>,
    user_id: &str,
    query: HistoryQuery,
) -> Result<HistoryResponse, ApiError> {
    let transactions = ledger::history(
        &ctx,
        user_id,
        query.limit.unwrap_or(50),
        query.offset.unwrap_or(0),
    )
    .await
    .map_err(|e| e.to_api_error())?;
    Ok(HistoryResponse { transactions })
}
