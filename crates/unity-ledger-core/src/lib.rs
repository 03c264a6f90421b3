#![doc = include_str!("../README.md")]

pub mod db;
pub mod env;
pub mod error;
pub mod options;
pub mod provider;
pub mod utils;

// Re-exports for convenience
pub use db::adapter::{Adapter, AdapterResult, TransactionAdapter};
pub use db::models::{
    AccountBalance, LedgerTransaction, PaymentSession, PaymentSessionStatus, ReferralLink,
    ReferralStatus, Subscription, SubscriptionStatus, TransactionKind, TransactionStatus,
};
pub use error::{ApiError, ErrorCode, LedgerError, Result};
pub use options::{BillingInterval, LedgerOptions, PlanConfig};
pub use provider::{CallbackStatus, PaymentProvider, ProviderCallback};
