// NOWPayments API wire types.
//
// The API reports amounts in two currencies per payment: `price_amount` is
// the fiat amount the merchant asked for, `pay_amount` the crypto amount the
// customer sends. The ledger credits off the fiat figure, so callbacks carry
// `price_amount` into `ProviderCallback::pay_amount`.

use serde::{Deserialize, Deserializer, Serialize};

use unity_ledger_core::provider::{CallbackStatus, ProviderCallback};

/// POST /payment request body.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreatePaymentBody {
    pub price_amount: f64,
    pub price_currency: String,
    pub pay_currency: String,
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipn_callback_url: Option<String>,
}

/// POST /payment response body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreatePaymentResponse {
    #[serde(deserialize_with = "de_id")]
    pub payment_id: String,
    pub pay_address: String,
    pub pay_amount: f64,
    #[serde(default)]
    pub valid_until: Option<chrono::DateTime<chrono::Utc>>,
}

/// GET /payment/:id response body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PaymentStatusResponse {
    #[serde(deserialize_with = "de_id")]
    pub payment_id: String,
    pub payment_status: String,
    #[serde(default)]
    pub price_amount: f64,
}

impl PaymentStatusResponse {
    pub fn into_callback(self) -> ProviderCallback {
        ProviderCallback {
            payment_id: self.payment_id,
            status: map_payment_status(&self.payment_status),
            pay_amount: self.price_amount,
        }
    }
}

/// IPN callback body. Same shape as the status response plus order echo.
#[derive(Debug, Clone, Deserialize)]
pub struct IpnPayload {
    #[serde(deserialize_with = "de_id")]
    pub payment_id: String,
    pub payment_status: String,
    #[serde(default)]
    pub price_amount: f64,
    #[serde(default)]
    pub order_id: Option<String>,
}

impl IpnPayload {
    pub fn into_callback(self) -> ProviderCallback {
        ProviderCallback {
            payment_id: self.payment_id,
            status: map_payment_status(&self.payment_status),
            pay_amount: self.price_amount,
        }
    }
}

/// Map NOWPayments' status vocabulary onto the engine's.
///
/// `partially_paid` stays non-terminal: the customer may still top up, and
/// the provider moves it to `finished` or `expired` on its own.
pub fn map_payment_status(status: &str) -> CallbackStatus {
    match status {
        "finished" => CallbackStatus::Finished,
        "failed" | "refunded" | "expired" => CallbackStatus::Failed,
        "confirming" | "confirmed" | "sending" | "partially_paid" => CallbackStatus::Confirming,
        "waiting" => CallbackStatus::Waiting,
        _ => CallbackStatus::Unknown,
    }
}

/// NOWPayments sends `payment_id` as a JSON number; accept both shapes.
fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(u64),
        Str(String),
    }
    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Num(n) => n.to_string(),
        IdRepr::Str(s) => s,
    })
}
