// Payment session manager.
//
// Two ways to buy a plan:
//
// - crypto: open a hosted payment with the external provider and record a
//   pending session. Nothing touches the ledger until the webhook reports
//   the payment finished.
// - UNITY tokens: debit the price immediately and activate in one call; the
//   session row is recorded already completed.
//
// The session row is inserted only after the provider call succeeds, so a
// provider failure leaves no state behind.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use unity_ledger_core::db::models::{
    PaymentSession, PaymentSessionStatus, TransactionKind,
};
use unity_ledger_core::error::{LedgerError, Result};
use unity_ledger_core::options::BillingInterval;
use unity_ledger_core::provider::CreateProviderPayment;
use unity_ledger_core::utils::id::generate_id;

use crate::context::LedgerContext;
use crate::ledger::{self, DebitParams};
use crate::payments::webhook;
use crate::store;
use crate::subscription;

/// Provider name recorded on sessions paid directly in UNITY tokens.
pub const UNITY_PROVIDER: &str = "unity";

// ─── Crypto Sessions ─────────────────────────────────────────────

/// Parameters for opening a crypto payment session.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCryptoSession {
    pub user_id: String,
    pub plan_id: String,
    pub interval: BillingInterval,
    /// Crypto currency the customer pays in (e.g. "btc", "usdttrc20").
    pub pay_currency: String,
}

/// What the client needs to complete a crypto payment.
#[derive(Debug, Clone, Serialize)]
pub struct CryptoSessionResponse {
    pub session_id: String,
    pub payment_id: String,
    pub pay_address: String,
    pub pay_amount: f64,
    pub pay_currency: String,
    pub expires_at: DateTime<Utc>,
}

/// Open a crypto payment session for a plan purchase.
pub async fn create_crypto_session(
    ctx: &Arc<LedgerContext>,
    params: CreateCryptoSession,
) -> Result<CryptoSessionResponse> {
    let plan = ctx.options.require_plan(&params.plan_id)?;
    let price = plan.fiat_price(params.interval);
    let session_id = generate_id();

    let payment = ctx
        .provider
        .create_payment(CreateProviderPayment {
            price_amount: price,
            price_currency: "usd".into(),
            pay_currency: params.pay_currency.clone(),
            order_id: session_id.clone(),
            ipn_callback_url: ctx.options.callback_url.clone(),
        })
        .await?;

    let now = Utc::now();
    let expires_at = payment
        .valid_until
        .unwrap_or(now + Duration::minutes(ctx.options.session_ttl_minutes));

    let session = PaymentSession {
        id: session_id,
        user_id: params.user_id,
        plan_id: params.plan_id,
        interval: params.interval,
        requested_amount: price,
        pay_currency: params.pay_currency,
        provider: ctx.provider.name().to_string(),
        provider_payment_id: payment.payment_id.clone(),
        status: PaymentSessionStatus::Pending,
        ledger_transaction_id: None,
        created_at: now,
        expires_at,
    };
    let session = store::insert_session(ctx.db(), &session).await?;

    tracing::info!(
        session_id = %session.id,
        payment_id = %payment.payment_id,
        plan_id = %session.plan_id,
        "crypto payment session opened"
    );

    Ok(CryptoSessionResponse {
        session_id: session.id,
        payment_id: payment.payment_id,
        pay_address: payment.pay_address,
        pay_amount: payment.pay_amount,
        pay_currency: session.pay_currency,
        expires_at,
    })
}

// ─── UNITY Token Sessions ────────────────────────────────────────

/// Parameters for buying a plan directly with UNITY tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTokenSession {
    pub user_id: String,
    pub plan_id: String,
    pub interval: BillingInterval,
}

/// Result of a UNITY-token plan purchase. Settles synchronously.
#[derive(Debug, Clone, Serialize)]
pub struct TokenSessionResponse {
    pub session_id: String,
    pub tokens_charged: i64,
    pub subscription_id: String,
    pub period_end: DateTime<Utc>,
}

/// Buy a plan with UNITY tokens: debit the token price, record a completed
/// session, activate the subscription. Fails with `InsufficientBalance`
/// before any state is written.
pub async fn create_token_session(
    ctx: &Arc<LedgerContext>,
    params: CreateTokenSession,
) -> Result<TokenSessionResponse> {
    let plan = ctx.options.require_plan(&params.plan_id)?;
    let tokens = plan.unity_price(params.interval);
    let session_id = generate_id();

    let txn = ledger::debit(
        ctx,
        DebitParams {
            user_id: params.user_id.clone(),
            amount: tokens,
            kind: TransactionKind::Payment,
            description: format!("{} plan purchase with UNITY", params.plan_id),
            external_ref: Some(format!("unity_session:{session_id}")),
        },
    )
    .await?;

    let now = Utc::now();
    let session = PaymentSession {
        id: session_id,
        user_id: params.user_id.clone(),
        plan_id: params.plan_id.clone(),
        interval: params.interval,
        requested_amount: 0.0,
        pay_currency: "unity".into(),
        provider: UNITY_PROVIDER.to_string(),
        provider_payment_id: format!("unity:{}", txn.id),
        status: PaymentSessionStatus::Completed,
        ledger_transaction_id: Some(txn.id),
        created_at: now,
        expires_at: now,
    };
    let session = store::insert_session(ctx.db(), &session).await?;

    let subscription = subscription::activate(
        ctx,
        &params.user_id,
        &params.plan_id,
        params.interval,
        UNITY_PROVIDER,
    )
    .await?;

    tracing::info!(
        session_id = %session.id,
        user_id = %params.user_id,
        tokens,
        "plan purchased with UNITY tokens"
    );

    Ok(TokenSessionResponse {
        session_id: session.id,
        tokens_charged: tokens,
        subscription_id: subscription.id,
        period_end: subscription.period_end,
    })
}

// ─── Status / Maintenance ────────────────────────────────────────

/// Client-facing view of a payment session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub status: PaymentSessionStatus,
    pub plan_id: String,
    pub provider: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_transaction_id: Option<String>,
}

impl From<PaymentSession> for SessionStatusResponse {
    fn from(session: PaymentSession) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
            plan_id: session.plan_id,
            provider: session.provider,
            expires_at: session.expires_at,
            ledger_transaction_id: session.ledger_transaction_id,
        }
    }
}

/// The stored status of a session.
pub async fn get_session_status(
    ctx: &Arc<LedgerContext>,
    session_id: &str,
) -> Result<SessionStatusResponse> {
    let session = store::find_session(ctx.db(), session_id)
        .await?
        .ok_or(LedgerError::NotFound("payment_session"))?;
    Ok(session.into())
}

/// Poll the provider for a session's current payment state and reconcile it
/// through the same path a webhook would take. Terminal sessions return the
/// stored row without a provider round trip.
pub async fn poll_session(
    ctx: &Arc<LedgerContext>,
    session_id: &str,
) -> Result<SessionStatusResponse> {
    let session = store::find_session(ctx.db(), session_id)
        .await?
        .ok_or(LedgerError::NotFound("payment_session"))?;
    if session.status.is_terminal() {
        return Ok(session.into());
    }

    let callback = ctx.provider.get_payment(&session.provider_payment_id).await?;
    webhook::handle_provider_callback(ctx, callback).await?;

    let refreshed = store::find_session(ctx.db(), session_id)
        .await?
        .ok_or(LedgerError::NotFound("payment_session"))?;
    Ok(refreshed.into())
}

/// Mark pending sessions past their deadline as expired. Run periodically;
/// returns the number of sessions swept.
pub async fn expire_stale_sessions(ctx: &Arc<LedgerContext>) -> Result<i64> {
    let swept = store::expire_sessions_before(ctx.db(), Utc::now()).await?;
    if swept > 0 {
        tracing::info!(swept, "expired stale payment sessions");
    }
    Ok(swept)
}
