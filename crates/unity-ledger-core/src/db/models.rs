// Typed row models for the ledger tables.
//
// Rows travel through the adapter as JSON; these structs are the typed view
// the engine works with. Amounts are integers in the smallest UNITY unit;
// transaction amounts are signed (credits positive, debits negative) so the
// sum of a user's completed transactions reconstructs their balance.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::LedgerError;

/// Decode a JSON row into a typed model.
pub fn from_value<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, LedgerError> {
    serde_json::from_value(value).map_err(|e| LedgerError::Serialization(e.to_string()))
}

/// Encode a typed model into a JSON row.
pub fn to_value<T: Serialize>(model: &T) -> Result<serde_json::Value, LedgerError> {
    serde_json::to_value(model).map_err(|e| LedgerError::Serialization(e.to_string()))
}

// ─── Account Balance ─────────────────────────────────────────────

/// One row per user. Invariants: `balance >= 0` and
/// `balance == total_earned - total_spent` after every committed operation.
/// Only the ledger engine writes this row, always conditionally on `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    pub user_id: String,
    pub balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountBalance {
    /// A fresh zero balance for a user seen for the first time.
    pub fn zero(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            balance: 0,
            total_earned: 0,
            total_spent: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

// ─── Ledger Transaction ──────────────────────────────────────────

/// What kind of balance movement a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Credit,
    Debit,
    TransferOut,
    TransferIn,
    Payment,
    Referral,
    OnboardingBonus,
}

/// Lifecycle of a ledger transaction. Immutable once terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// Append-only audit record of one balance-affecting event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: String,
    pub user_id: String,
    /// Signed amount in smallest UNITY units.
    pub amount: i64,
    pub kind: TransactionKind,
    pub description: String,
    pub status: TransactionStatus,
    /// Idempotency key: provider payment id, referral link id, etc.
    /// Unique when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ─── Payment Session ─────────────────────────────────────────────

/// Lifecycle of an externally-hosted payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSessionStatus {
    Pending,
    Confirming,
    Completed,
    Failed,
    Expired,
}

impl PaymentSessionStatus {
    /// Terminal sessions are never transitioned again — the reconciler's
    /// first idempotency boundary.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One row per externally-initiated payment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    /// Billing interval purchased; settlement reads the subscription
    /// duration from it.
    pub interval: crate::options::BillingInterval,
    /// Fiat amount the provider was asked to collect.
    pub requested_amount: f64,
    pub pay_currency: String,
    pub provider: String,
    pub provider_payment_id: String,
    pub status: PaymentSessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ─── Subscription ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

/// At most one active row per user; superseded rows are marked inactive,
/// never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub payment_provider: String,
    pub created_at: DateTime<Utc>,
}

// ─── Referral Link ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Completed,
}

/// Pairs a referrer with a referred account. Paid out at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralLink {
    pub id: String,
    pub referrer_id: String,
    pub referred_id: String,
    pub status: ReferralStatus,
    pub commission_paid: bool,
    pub commission_amount: i64,
    pub created_at: DateTime<Utc>,
}
