#![doc = include_str!("../README.md")]

pub mod context;
pub mod ledger;
pub mod payments;
pub mod referral;
pub mod routes;
pub mod settlement;
pub mod store;
pub mod subscription;

pub use context::LedgerContext;

// Re-export the core types callers need to drive the engine.
pub use unity_ledger_core::db::adapter::Adapter;
pub use unity_ledger_core::db::models::{
    AccountBalance, LedgerTransaction, PaymentSession, PaymentSessionStatus, ReferralLink,
    Subscription, TransactionKind, TransactionStatus,
};
pub use unity_ledger_core::error::{ApiError, ErrorCode, LedgerError};
pub use unity_ledger_core::options::{BillingInterval, LedgerOptions, PlanConfig};
pub use unity_ledger_core::provider::{CallbackStatus, PaymentProvider, ProviderCallback};
