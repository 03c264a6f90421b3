#![doc = include_str!("../README.md")]

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use unity_ledger::context::LedgerContext;
use unity_ledger::routes;
use unity_ledger_core::error::{ApiError, ErrorCode, HttpStatus};
use unity_ledger_nowpayments::{parse_ipn, verify_ipn_signature};

// ─── Error Handling ──────────────────────────────────────────────

/// Axum-facing wrapper around the engine's `ApiError` (orphan rules keep the
/// `IntoResponse` impl here).
pub struct RouteError(ApiError);

impl From<ApiError> for RouteError {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_json())).into_response()
    }
}

fn unauthorized() -> RouteError {
    RouteError(ApiError::with_message(
        HttpStatus::Unauthorized,
        ErrorCode::Unauthorized,
        "missing x-user-id header",
    ))
}

fn bad_request(message: impl Into<String>) -> RouteError {
    RouteError(ApiError::with_message(
        HttpStatus::BadRequest,
        ErrorCode::MalformedPayload,
        message,
    ))
}

/// The authenticated caller, read from the `x-user-id` header set by the
/// authentication layer in front of this router.
fn require_user(headers: &HeaderMap) -> Result<String, RouteError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(unauthorized)
}

// ─── Shared State ────────────────────────────────────────────────

#[derive(Clone)]
struct AppState {
    ctx: Arc<LedgerContext>,
    ipn_secret: Option<String>,
}

// ─── UnityLedger Builder ─────────────────────────────────────────

/// The main entry point for mounting the UNITY ledger on Axum.
pub struct UnityLedger {
    ctx: Arc<LedgerContext>,
    ipn_secret: Option<String>,
}

impl UnityLedger {
    /// Create from an initialized `LedgerContext`.
    pub fn from_context(ctx: Arc<LedgerContext>) -> Self {
        Self {
            ctx,
            ipn_secret: None,
        }
    }

    /// Enable webhook signature verification with the provider's IPN secret.
    /// Without it, every webhook is rejected.
    pub fn with_ipn_secret(mut self, secret: impl Into<String>) -> Self {
        self.ipn_secret = Some(secret.into());
        self
    }

    /// Get a reference to the ledger context.
    pub fn context(&self) -> &Arc<LedgerContext> {
        &self.ctx
    }

    /// Build the Axum `Router` with all ledger endpoints.
    pub fn router(&self) -> Router {
        let state = AppState {
            ctx: self.ctx.clone(),
            ipn_secret: self.ipn_secret.clone(),
        };

        Router::new()
            .route("/ok", get(handle_ok))
            .route("/payments/crypto/create", post(handle_create_crypto))
            .route("/payments/unity/create", post(handle_create_unity))
            .route("/payments/status/{id}", get(handle_payment_status))
            .route("/payments/webhook", post(handle_webhook))
            .route("/tokens/transfer", post(handle_transfer))
            .route("/tokens/balance", get(handle_balance))
            .route("/tokens/history", get(handle_history))
            .with_state(state)
    }

    /// Build the router with permissive CORS. For production, configure
    /// CORS yourself.
    pub fn router_with_cors(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        self.router().layer(cors)
    }
}

// ─── Route Handlers ─────────────────────────────────────────────

async fn handle_ok() -> impl IntoResponse {
    Json(routes::ok::handle_ok())
}

async fn handle_create_crypto(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<routes::payments::CreateCryptoPaymentRequest>,
) -> Result<impl IntoResponse, RouteError> {
    let user_id = require_user(&headers)?;
    let result =
        routes::payments::handle_create_crypto_payment(state.ctx, &user_id, body).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn handle_create_unity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<routes::payments::CreateUnityPaymentRequest>,
) -> Result<impl IntoResponse, RouteError> {
    let user_id = require_user(&headers)?;
    let result = routes::payments::handle_create_unity_payment(state.ctx, &user_id, body).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn handle_payment_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<routes::payments::PaymentStatusQuery>,
) -> Result<impl IntoResponse, RouteError> {
    let result = routes::payments::handle_payment_status(state.ctx, &session_id, query).await?;
    Ok(Json(result))
}

/// Webhook endpoint. Bad signatures and unparseable bodies get 400 so the
/// sender knows the delivery itself was broken; everything the reconciler
/// can classify — including unknown payments and replays — gets 200.
async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, RouteError> {
    let signature = headers
        .get("x-nowpayments-sig")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| bad_request("missing webhook signature"))?;

    verify_ipn_signature(state.ipn_secret.as_deref(), &body, signature).map_err(|e| {
        tracing::warn!(error = %e, "rejected webhook delivery");
        bad_request(e.to_string())
    })?;

    let callback = parse_ipn(&body).map_err(|e| bad_request(e.to_string()))?;

    let result = routes::webhook::handle_webhook(state.ctx, callback).await?;
    Ok(Json(result))
}

async fn handle_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<routes::transfer::TransferRequest>,
) -> Result<impl IntoResponse, RouteError> {
    let user_id = require_user(&headers)?;
    let result = routes::transfer::handle_transfer(state.ctx, &user_id, body).await?;
    Ok(Json(result))
}

async fn handle_balance(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, RouteError> {
    let user_id = require_user(&headers)?;
    let result = routes::balance::handle_get_balance(state.ctx, &user_id).await?;
    Ok(Json(result))
}

async fn handle_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<routes::balance::HistoryQuery>,
) -> Result<impl IntoResponse, RouteError> {
    let user_id = require_user(&headers)?;
    let result = routes::balance::handle_history(state.ctx, &user_id, query).await?;
    Ok(Json(result))
}
