// Ledger context.
//
// Holds the fully-initialized engine configuration for request processing:
// options, the storage adapter, and the payment provider client. Created once
// at startup and shared across handlers as `Arc<LedgerContext>`.

use std::sync::Arc;

use unity_ledger_core::db::adapter::Adapter;
use unity_ledger_core::db::schema::LedgerSchema;
use unity_ledger_core::error::{LedgerError, Result};
use unity_ledger_core::options::LedgerOptions;
use unity_ledger_core::provider::PaymentProvider;

use crate::settlement::SettlementQueue;

/// The fully-initialized ledger context, shared across all request handlers.
pub struct LedgerContext {
    /// The original configuration options.
    pub options: LedgerOptions,

    /// The storage adapter for balances, transactions, sessions,
    /// subscriptions, and referral links.
    pub adapter: Arc<dyn Adapter>,

    /// The external payment provider client.
    pub provider: Arc<dyn PaymentProvider>,

    /// Post-settlement hooks (notifications, analytics) queued during
    /// reconciliation and run after the ledger writes commit.
    pub settlement: SettlementQueue,
}

impl std::fmt::Debug for LedgerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerContext")
            .field("options", &self.options)
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl LedgerContext {
    /// Create a new context from options, a storage adapter, and a payment
    /// provider. Validates the configuration and registers the ledger schema
    /// with the backend.
    pub async fn init(
        options: LedgerOptions,
        adapter: Arc<dyn Adapter>,
        provider: Arc<dyn PaymentProvider>,
    ) -> Result<Arc<Self>> {
        if options.commission_rate < 0.0 || options.commission_rate >= 1.0 {
            return Err(LedgerError::Config(
                "commission_rate must be in [0, 1)".into(),
            ));
        }
        if options.unity_per_usd <= 0.0 {
            return Err(LedgerError::Config("unity_per_usd must be positive".into()));
        }

        adapter.create_schema(&LedgerSchema::core_schema()).await?;

        tracing::info!(
            provider = provider.name(),
            plans = options.plans.len(),
            "ledger context initialized"
        );

        Ok(Arc::new(Self {
            options,
            adapter,
            provider,
            settlement: SettlementQueue::new(),
        }))
    }

    /// The adapter as a trait object, for passing to store functions.
    pub fn db(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use unity_ledger_core::db::adapter::{
        AdapterResult, FindManyQuery, TransactionAdapter, WhereClause,
    };
    use unity_ledger_core::provider::{CreateProviderPayment, ProviderCallback, ProviderPayment};

    #[derive(Debug)]
    struct NullAdapter;

    #[async_trait]
    impl Adapter for NullAdapter {
        async fn create(&self, _: &str, data: serde_json::Value) -> AdapterResult<serde_json::Value> {
            Ok(data)
        }
        async fn find_one(
            &self,
            _: &str,
            _: &[WhereClause],
        ) -> AdapterResult<Option<serde_json::Value>> {
            Ok(None)
        }
        async fn find_many(
            &self,
            _: &str,
            _: FindManyQuery,
        ) -> AdapterResult<Vec<serde_json::Value>> {
            Ok(Vec::new())
        }
        async fn count(&self, _: &str, _: &[WhereClause]) -> AdapterResult<i64> {
            Ok(0)
        }
        async fn update(
            &self,
            _: &str,
            _: &[WhereClause],
            _: serde_json::Value,
        ) -> AdapterResult<Option<serde_json::Value>> {
            Ok(None)
        }
        async fn update_many(
            &self,
            _: &str,
            _: &[WhereClause],
            _: serde_json::Value,
        ) -> AdapterResult<i64> {
            Ok(0)
        }
        async fn delete_many(&self, _: &str, _: &[WhereClause]) -> AdapterResult<i64> {
            Ok(0)
        }
        async fn create_schema(&self, _: &LedgerSchema) -> AdapterResult<()> {
            Ok(())
        }
        async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
            Err(LedgerError::Storage("unsupported".into()))
        }
    }

    #[derive(Debug)]
    struct NullProvider;

    #[async_trait]
    impl PaymentProvider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }
        async fn create_payment(
            &self,
            _: CreateProviderPayment,
        ) -> std::result::Result<ProviderPayment, LedgerError> {
            Err(LedgerError::ProviderUnavailable("null provider".into()))
        }
        async fn get_payment(
            &self,
            _: &str,
        ) -> std::result::Result<ProviderCallback, LedgerError> {
            Err(LedgerError::ProviderUnavailable("null provider".into()))
        }
    }

    #[tokio::test]
    async fn init_validates_commission_rate() {
        let options = LedgerOptions {
            commission_rate: 1.5,
            ..Default::default()
        };
        let result =
            LedgerContext::init(options, Arc::new(NullAdapter), Arc::new(NullProvider)).await;
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[tokio::test]
    async fn init_succeeds_with_defaults() {
        let ctx =
            LedgerContext::init(LedgerOptions::default(), Arc::new(NullAdapter), Arc::new(NullProvider))
                .await
                .unwrap();
        assert_eq!(ctx.provider.name(), "null");
    }
}
