// Webhook route: POST /payments/webhook.
//
// The transport layer verifies the provider signature and parses the raw
// body into a `ProviderCallback` before this handler runs. Everything the
// reconciler can classify is acknowledged with 200 — including unknown
// payments and replays — because a non-2xx answer only buys endless
// redelivery. Malformed bodies and bad signatures are rejected upstream.

use std::sync::Arc;

use serde::Serialize;

use unity_ledger_core::error::ApiError;
use unity_ledger_core::provider::ProviderCallback;

use crate::context::LedgerContext;
use crate::payments::webhook::{self, CallbackOutcome};

/// Webhook acknowledgement body.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub outcome: CallbackOutcome,
}

/// Handle POST /payments/webhook.
///
/// Errors — including a replay racing an unfinished first delivery, which
/// surfaces as `DuplicateEvent` — answer non-2xx so the provider redelivers
/// once the first delivery has either settled or released its claim.
pub async fn handle_webhook(
    ctx: Arc<LedgerContext>,
    callback: ProviderCallback,
) -> Result<WebhookResponse, ApiError> {
    let outcome = webhook::handle_provider_callback(&ctx, callback)
        .await
        .map_err(|e| e.to_api_error())?;
    Ok(WebhookResponse { outcome })
}
