// Ledger configuration.
//
// The plan table is static configuration: the engine looks prices up here,
// it never computes or discovers them. Conversion between fiat and UNITY
// uses the fixed `unity_per_usd` rate in force at the time of the operation.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Billing interval for a subscription purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Monthly,
    Yearly,
}

/// A subscription plan: fiat and UNITY prices per interval, plus duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    pub id: String,
    /// Fiat prices in USD.
    pub price_monthly: f64,
    pub price_yearly: f64,
    /// UNITY prices in smallest token units.
    pub unity_price_monthly: i64,
    pub unity_price_yearly: i64,
    /// Subscription length granted per purchase, per interval.
    pub duration_days_monthly: i64,
    pub duration_days_yearly: i64,
}

impl PlanConfig {
    pub fn fiat_price(&self, interval: BillingInterval) -> f64 {
        match interval {
            BillingInterval::Monthly => self.price_monthly,
            BillingInterval::Yearly => self.price_yearly,
        }
    }

    pub fn unity_price(&self, interval: BillingInterval) -> i64 {
        match interval {
            BillingInterval::Monthly => self.unity_price_monthly,
            BillingInterval::Yearly => self.unity_price_yearly,
        }
    }

    pub fn duration_days(&self, interval: BillingInterval) -> i64 {
        match interval {
            BillingInterval::Monthly => self.duration_days_monthly,
            BillingInterval::Yearly => self.duration_days_yearly,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerOptions {
    /// Available subscription plans.
    #[serde(default)]
    pub plans: Vec<PlanConfig>,
    /// Referral commission as a fraction of the fiat payment amount.
    #[serde(default = "default_commission_rate")]
    pub commission_rate: f64,
    /// Fixed fiat-to-UNITY conversion rate (tokens per USD).
    #[serde(default = "default_unity_per_usd")]
    pub unity_per_usd: f64,
    /// How many times a version-conditioned balance write is retried before
    /// the operation fails with `Contention`.
    #[serde(default = "default_max_version_retries")]
    pub max_version_retries: u32,
    /// How long a payment session stays honored before the expiry sweep
    /// marks it `expired`.
    #[serde(default = "default_session_ttl_minutes")]
    pub session_ttl_minutes: i64,
    /// One-time signup credit, in UNITY. Zero disables it.
    #[serde(default)]
    pub onboarding_bonus: i64,
    /// URL the provider posts webhook callbacks to.
    #[serde(default)]
    pub callback_url: Option<String>,
}

fn default_commission_rate() -> f64 {
    0.2
}
fn default_unity_per_usd() -> f64 {
    8.5
}
fn default_max_version_retries() -> u32 {
    5
}
fn default_session_ttl_minutes() -> i64 {
    60
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            plans: Vec::new(),
            commission_rate: default_commission_rate(),
            unity_per_usd: default_unity_per_usd(),
            max_version_retries: default_max_version_retries(),
            session_ttl_minutes: default_session_ttl_minutes(),
            onboarding_bonus: 0,
            callback_url: None,
        }
    }
}

impl LedgerOptions {
    /// Find a plan by ID.
    pub fn find_plan(&self, plan_id: &str) -> Option<&PlanConfig> {
        self.plans.iter().find(|p| p.id == plan_id)
    }

    /// Find a plan or fail with `PlanNotFound`.
    pub fn require_plan(&self, plan_id: &str) -> Result<&PlanConfig, LedgerError> {
        self.find_plan(plan_id)
            .ok_or_else(|| LedgerError::PlanNotFound(plan_id.to_string()))
    }

    /// Convert a fiat amount to whole UNITY tokens at the configured rate.
    pub fn fiat_to_unity(&self, fiat_amount: f64) -> i64 {
        (fiat_amount * self.unity_per_usd).round() as i64
    }

    /// Referral commission in UNITY for a given fiat payment.
    pub fn commission_tokens(&self, fiat_amount: f64) -> i64 {
        self.fiat_to_unity(fiat_amount * self.commission_rate)
    }

    /// Load configuration from `UNITY_LEDGER_*` environment variables on top
    /// of the defaults. Unset variables keep their default; a set but
    /// malformed value is a configuration error, never silently ignored.
    ///
    /// `UNITY_LEDGER_PLANS` holds the plan table as a JSON array.
    pub fn from_env() -> Result<Self, LedgerError> {
        let mut options = Self::default();

        if let Some(raw) = read_env("UNITY_LEDGER_PLANS") {
            options.plans = serde_json::from_str(&raw)
                .map_err(|e| LedgerError::Config(format!("UNITY_LEDGER_PLANS: {e}")))?;
        }
        if let Some(rate) = parse_env("UNITY_LEDGER_COMMISSION_RATE")? {
            options.commission_rate = rate;
        }
        if let Some(rate) = parse_env("UNITY_LEDGER_UNITY_PER_USD")? {
            options.unity_per_usd = rate;
        }
        if let Some(retries) = parse_env("UNITY_LEDGER_MAX_VERSION_RETRIES")? {
            options.max_version_retries = retries;
        }
        if let Some(ttl) = parse_env("UNITY_LEDGER_SESSION_TTL_MINUTES")? {
            options.session_ttl_minutes = ttl;
        }
        if let Some(bonus) = parse_env("UNITY_LEDGER_ONBOARDING_BONUS")? {
            options.onboarding_bonus = bonus;
        }
        options.callback_url = read_env("UNITY_LEDGER_CALLBACK_URL");

        Ok(options)
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T>(name: &str) -> Result<Option<T>, LedgerError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match read_env(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| LedgerError::Config(format!("{name}: {e}"))),
        None => Ok(None),
    }
}
