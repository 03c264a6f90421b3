// Shared test fixtures: a scriptable mock payment provider and a context
// builder wired to the in-memory adapter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use unity_ledger::{LedgerContext, LedgerOptions, PaymentProvider, PlanConfig};
use unity_ledger_core::error::LedgerError;
use unity_ledger_core::provider::{
    CallbackStatus, CreateProviderPayment, ProviderCallback, ProviderPayment,
};
use unity_ledger_memory::MemoryAdapter;

/// Scriptable payment provider. Assigns sequential payment ids and serves
/// whatever status the test scripted via `set_status`.
#[derive(Debug, Default)]
pub struct MockProvider {
    pub fail_create: AtomicBool,
    statuses: Mutex<HashMap<String, ProviderCallback>>,
    counter: AtomicU32,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, payment_id: &str, status: CallbackStatus, pay_amount: f64) {
        let mut statuses = self.statuses.lock().unwrap();
        statuses.insert(
            payment_id.to_string(),
            ProviderCallback {
                payment_id: payment_id.to_string(),
                status,
                pay_amount,
            },
        );
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    fn name(&self) -> &str {
        "mockpay"
    }

    async fn create_payment(
        &self,
        request: CreateProviderPayment,
    ) -> Result<ProviderPayment, LedgerError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(LedgerError::ProviderUnavailable("scripted outage".into()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderPayment {
            payment_id: format!("mp_{n}"),
            pay_address: format!("addr_{n}"),
            pay_amount: request.price_amount / 50_000.0,
            valid_until: None,
        })
    }

    async fn get_payment(&self, payment_id: &str) -> Result<ProviderCallback, LedgerError> {
        let statuses = self.statuses.lock().unwrap();
        Ok(statuses.get(payment_id).cloned().unwrap_or(ProviderCallback {
            payment_id: payment_id.to_string(),
            status: CallbackStatus::Waiting,
            pay_amount: 0.0,
        }))
    }
}

pub fn basic_plan() -> PlanConfig {
    PlanConfig {
        id: "basic".into(),
        price_monthly: 20.0,
        price_yearly: 200.0,
        unity_price_monthly: 170,
        unity_price_yearly: 1700,
        duration_days_monthly: 30,
        duration_days_yearly: 365,
    }
}

pub fn test_options() -> LedgerOptions {
    LedgerOptions {
        plans: vec![basic_plan()],
        onboarding_bonus: 25,
        // High enough that version races in the concurrency tests never
        // exhaust the retry budget.
        max_version_retries: 50,
        ..Default::default()
    }
}

/// A context over a fresh memory adapter and mock provider.
pub async fn test_ctx() -> (Arc<LedgerContext>, Arc<MockProvider>) {
    let provider = MockProvider::new();
    let ctx = LedgerContext::init(
        test_options(),
        Arc::new(MemoryAdapter::new()),
        provider.clone(),
    )
    .await
    .expect("context init");
    (ctx, provider)
}
