// NOWPayments HTTP client.
//
// Transport failures, timeouts, and non-2xx answers all surface as
// `ProviderUnavailable` — the engine treats them uniformly as "try again
// later" and leaves no ledger state behind.

use std::time::Duration;

use async_trait::async_trait;

use unity_ledger_core::error::{LedgerError, Result};
use unity_ledger_core::provider::{
    CreateProviderPayment, PaymentProvider, ProviderCallback, ProviderPayment,
};

use crate::config::NowPaymentsOptions;
use crate::types::{CreatePaymentBody, CreatePaymentResponse, PaymentStatusResponse};

/// NOWPayments implementation of [`PaymentProvider`].
#[derive(Debug, Clone)]
pub struct NowPaymentsClient {
    options: NowPaymentsOptions,
    http: reqwest::Client,
}

impl NowPaymentsClient {
    pub fn new(options: NowPaymentsOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| LedgerError::Config(format!("http client: {e}")))?;
        Ok(Self { options, http })
    }

    /// The configured IPN secret, for webhook verification.
    pub fn ipn_secret(&self) -> Option<&str> {
        self.options.ipn_secret.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.options.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), body, "provider request failed");
        Err(LedgerError::ProviderUnavailable(format!(
            "nowpayments returned {status}"
        )))
    }
}

#[async_trait]
impl PaymentProvider for NowPaymentsClient {
    fn name(&self) -> &str {
        "nowpayments"
    }

    async fn create_payment(&self, request: CreateProviderPayment) -> Result<ProviderPayment> {
        let body = CreatePaymentBody {
            price_amount: request.price_amount,
            price_currency: request.price_currency,
            pay_currency: request.pay_currency,
            order_id: request.order_id,
            ipn_callback_url: request.ipn_callback_url,
        };

        let response = self
            .http
            .post(self.url("/payment"))
            .header("x-api-key", &self.options.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::ProviderUnavailable(e.to_string()))?;
        let response = Self::check(response).await?;

        let payment: CreatePaymentResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::ProviderUnavailable(format!("bad response body: {e}")))?;

        Ok(ProviderPayment {
            payment_id: payment.payment_id,
            pay_address: payment.pay_address,
            pay_amount: payment.pay_amount,
            valid_until: payment.valid_until,
        })
    }

    async fn get_payment(&self, payment_id: &str) -> Result<ProviderCallback> {
        let response = self
            .http
            .get(self.url(&format!("/payment/{payment_id}")))
            .header("x-api-key", &self.options.api_key)
            .send()
            .await
            .map_err(|e| LedgerError::ProviderUnavailable(e.to_string()))?;
        let response = Self::check(response).await?;

        let status: PaymentStatusResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::ProviderUnavailable(format!("bad response body: {e}")))?;
        Ok(status.into_callback())
    }
}
