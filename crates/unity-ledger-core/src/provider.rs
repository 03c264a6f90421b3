// The external payment-provider seam.
//
// The engine treats the provider as an untrusted, retrying, eventually-
// consistent collaborator: calls out are bounded by a timeout inside the
// implementation, and everything coming back in (webhook callbacks, poll
// responses) is validated into `ProviderCallback` before it can touch the
// ledger. Unknown statuses map to `Unknown` and are ignored.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

// ─── Outbound ────────────────────────────────────────────────────

/// Request to open a hosted payment with the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProviderPayment {
    /// Fiat amount to collect.
    pub price_amount: f64,
    /// Fiat currency code (always "usd" today).
    pub price_currency: String,
    /// Crypto currency the customer pays in.
    pub pay_currency: String,
    /// Our internal order id, echoed back in callbacks.
    pub order_id: String,
    /// Where the provider posts status callbacks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipn_callback_url: Option<String>,
}

/// A payment as the provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPayment {
    /// Provider-assigned payment id; our idempotency key for reconciliation.
    pub payment_id: String,
    /// Address the customer pays to.
    pub pay_address: String,
    /// Amount due in `pay_currency` units.
    pub pay_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

/// The payment provider client contract.
#[async_trait]
pub trait PaymentProvider: Send + Sync + std::fmt::Debug {
    /// Provider name recorded on sessions (e.g. "nowpayments").
    fn name(&self) -> &str;

    /// Open a hosted payment. Transport failures and timeouts surface as
    /// `LedgerError::ProviderUnavailable`.
    async fn create_payment(
        &self,
        request: CreateProviderPayment,
    ) -> Result<ProviderPayment, LedgerError>;

    /// Poll the current status of a payment.
    async fn get_payment(&self, payment_id: &str) -> Result<ProviderCallback, LedgerError>;
}

// ─── Inbound ─────────────────────────────────────────────────────

/// Normalized payment status from a webhook callback or status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    /// Payment fully settled — the only status that credits the ledger.
    Finished,
    /// Terminal failure (failed, refunded, or provider-side expiry).
    Failed,
    /// On-chain confirmation in progress.
    Confirming,
    /// Created, waiting for the customer to pay.
    Waiting,
    /// Anything we do not recognize; acknowledged and ignored.
    Unknown,
}

impl CallbackStatus {
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, Self::Finished)
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// A validated, strongly-typed provider callback. The raw webhook body is
/// parsed into this before the reconciler sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCallback {
    pub payment_id: String,
    pub status: CallbackStatus,
    /// Fiat amount the provider reports as paid.
    pub pay_amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_is_the_only_crediting_status() {
        assert!(CallbackStatus::Finished.is_terminal_success());
        for status in [
            CallbackStatus::Failed,
            CallbackStatus::Confirming,
            CallbackStatus::Waiting,
            CallbackStatus::Unknown,
        ] {
            assert!(!status.is_terminal_success());
        }
    }

    #[test]
    fn only_failed_is_terminal_failure() {
        assert!(CallbackStatus::Failed.is_terminal_failure());
        assert!(!CallbackStatus::Confirming.is_terminal_failure());
        assert!(!CallbackStatus::Unknown.is_terminal_failure());
    }
}
