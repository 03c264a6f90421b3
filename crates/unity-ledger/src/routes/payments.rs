// Payment routes: session creation and status.
//
// POST /payments/crypto/create — open a provider-hosted crypto payment
// POST /payments/unity/create  — buy a plan with UNITY tokens
// GET  /payments/status/:id    — current session status

use std::sync::Arc;

use serde::Deserialize;

use unity_ledger_core::error::ApiError;
use unity_ledger_core::options::BillingInterval;

use crate::context::LedgerContext;
use crate::payments::sessions::{
    self, CreateCryptoSession, CreateTokenSession, CryptoSessionResponse, SessionStatusResponse,
    TokenSessionResponse,
};

/// Body for POST /payments/crypto/create. The paying user comes from the
/// authenticated identity.
#[derive(Debug, Deserialize)]
pub struct CreateCryptoPaymentRequest {
    pub plan_id: String,
    pub interval: BillingInterval,
    pub pay_currency: String,
}

/// Handle POST /payments/crypto/create.
pub async fn handle_create_crypto_payment(
    ctx: Arc<LedgerContext>,
    user_id: &str,
    body: CreateCryptoPaymentRequest,
) -> Result<CryptoSessionResponse, ApiError> {
    sessions::create_crypto_session(
        &ctx,
        CreateCryptoSession {
            user_id: user_id.to_string(),
            plan_id: body.plan_id,
            interval: body.interval,
            pay_currency: body.pay_currency,
        },
    )
    .await
    .map_err(|e| e.to_api_error())
}

/// Body for POST /payments/unity/create.
#[derive(Debug, Deserialize)]
pub struct CreateUnityPaymentRequest {
    pub plan_id: String,
    pub interval: BillingInterval,
}

/// Handle POST /payments/unity/create.
pub async fn handle_create_unity_payment(
    ctx: Arc<LedgerContext>,
    user_id: &str,
    body: CreateUnityPaymentRequest,
) -> Result<TokenSessionResponse, ApiError> {
    sessions::create_token_session(
        &ctx,
        CreateTokenSession {
            user_id: user_id.to_string(),
            plan_id: body.plan_id,
            interval: body.interval,
        },
    )
    .await
    .map_err(|e| e.to_api_error())
}

/// Query for GET /payments/status/:id.
#[derive(Debug, Default, Deserialize)]
pub struct PaymentStatusQuery {
    /// When true, poll the provider for fresh state instead of returning
    /// the stored row.
    #[serde(default)]
    pub refresh: bool,
}

/// Handle GET /payments/status/:id.
pub async fn handle_payment_status(
    ctx: Arc<LedgerContext>,
    session_id: &str,
    query: PaymentStatusQuery,
) -> Result<SessionStatusResponse, ApiError> {
    let result = if query.refresh {
        sessions::poll_session(&ctx, session_id).await
    } else {
        sessions::get_session_status(&ctx, session_id).await
    };
    result.map_err(|e| e.to_api_error())
}
