// NOWPayments client configuration.

use unity_ledger_core::env::{ipn_secret_from_env, provider_api_key_from_env};
use unity_ledger_core::error::{LedgerError, Result};

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.nowpayments.io/v1";

/// Configuration for the NOWPayments client.
#[derive(Debug, Clone)]
pub struct NowPaymentsOptions {
    /// API key sent as `x-api-key` on every request.
    pub api_key: String,
    /// IPN secret for webhook signature verification. Without it, webhook
    /// verification always fails closed.
    pub ipn_secret: Option<String>,
    /// API base URL; override for sandbox or tests.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl NowPaymentsOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ipn_secret: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }

    pub fn with_ipn_secret(mut self, secret: impl Into<String>) -> Self {
        self.ipn_secret = Some(secret.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build options from the environment.
    pub fn from_env() -> Result<Self> {
        let api_key = provider_api_key_from_env().ok_or_else(|| {
            LedgerError::Config("UNITY_LEDGER_PROVIDER_API_KEY is not set".into())
        })?;
        Ok(Self {
            ipn_secret: ipn_secret_from_env(),
            ..Self::new(api_key)
        })
    }
}
