// Transfer route: POST /tokens/transfer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use unity_ledger_core::error::ApiError;

use crate::context::LedgerContext;
use crate::ledger;

/// Transfer request body. The sender comes from the authenticated identity,
/// never from the body.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub to_user_id: String,
    /// Amount in smallest UNITY units.
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Transfer response: both legs of the committed transfer.
#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub out_transaction_id: String,
    pub in_transaction_id: String,
    pub amount: i64,
}

/// Handle POST /tokens/transfer.
pub async fn handle_transfer(
    ctx: Arc<LedgerContext>,
    user_id: &str,
    body: TransferRequest,
) -> Result<TransferResponse, ApiError> {
    let transfer = ledger::transfer(
        &ctx,
        user_id,
        &body.to_user_id,
        body.amount,
        body.description,
    )
    .await
    .map_err(|e| e.to_api_error())?;

    Ok(TransferResponse {
        out_transaction_id: transfer.out_transaction.id,
        in_transaction_id: transfer.in_transaction.id,
        amount: body.amount,
    })
}
