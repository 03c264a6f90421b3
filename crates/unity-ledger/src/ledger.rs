// The ledger engine: credit, debit, transfer.
//
// Every balance movement follows the same shape:
//
// 1. validate the amount
// 2. claim the idempotency key by inserting a pending transaction row
//    (unique `external_ref` — a duplicate insert means the event already ran)
// 3. version-conditioned balance write, retried up to `max_version_retries`
// 4. finalize the transaction row (completed, or failed with the ref released)
//
// The balance row is never written unconditionally, so two racing operations
// can interleave freely: one wins the version, the other re-reads and
// retries. Amounts on transaction rows are signed — credits positive, debits
// negative — so summing a user's completed rows reconstructs the balance.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use unity_ledger_core::db::adapter::Adapter;
use unity_ledger_core::db::models::{
    AccountBalance, LedgerTransaction, TransactionKind, TransactionStatus,
};
use unity_ledger_core::error::{LedgerError, Result};
use unity_ledger_core::utils::id::generate_id;

use crate::context::LedgerContext;
use crate::store;

// ─── Credit ──────────────────────────────────────────────────────

/// Parameters for crediting tokens to an account.
#[derive(Debug, Clone)]
pub struct CreditParams {
    pub user_id: String,
    /// Positive amount in smallest UNITY units.
    pub amount: i64,
    pub kind: TransactionKind,
    pub description: String,
    /// Idempotency key. When set, at most one completed credit can ever
    /// exist for this key; replays return the original transaction.
    pub external_ref: Option<String>,
}

/// Credit tokens to a user's account.
///
/// With an `external_ref`, the operation is exactly-once: a replay finds the
/// key already claimed and returns the existing transaction unchanged.
pub async fn credit(ctx: &Arc<LedgerContext>, params: CreditParams) -> Result<LedgerTransaction> {
    credit_on(ctx.db(), ctx.options.max_version_retries, params).await
}

/// Credit implementation over an explicit adapter, so transfer legs can run
/// it inside a storage transaction.
pub(crate) async fn credit_on(
    db: &dyn Adapter,
    max_retries: u32,
    params: CreditParams,
) -> Result<LedgerTransaction> {
    if params.amount <= 0 {
        return Err(LedgerError::InvalidAmount);
    }

    let txn = LedgerTransaction {
        id: generate_id(),
        user_id: params.user_id.clone(),
        amount: params.amount,
        kind: params.kind,
        description: params.description,
        status: TransactionStatus::Pending,
        external_ref: params.external_ref.clone(),
        created_at: Utc::now(),
    };

    // Claiming the external_ref keyspace happens at insert: the unique
    // constraint makes exactly one claimant win, even under concurrency.
    let txn = match store::insert_transaction(db, &txn).await {
        Ok(txn) => txn,
        Err(LedgerError::Duplicate(_)) => {
            if let Some(ref external_ref) = params.external_ref {
                if let Some(existing) = store::find_transaction_by_ref(db, external_ref).await? {
                    // Only a completed claimant makes the replay a no-op. A
                    // pending claimant may yet fail and release the ref, so
                    // the caller must not treat this event as settled.
                    if existing.status == TransactionStatus::Completed {
                        tracing::debug!(
                            external_ref = %external_ref,
                            txn_id = %existing.id,
                            "credit replayed, returning existing transaction"
                        );
                        return Ok(existing);
                    }
                }
            }
            return Err(LedgerError::Duplicate(
                "ledger_transaction.external_ref".into(),
            ));
        }
        Err(e) => return Err(e),
    };

    for _ in 0..=max_retries {
        let current = store::ensure_balance(db, &params.user_id).await?;
        let written = store::write_balance(
            db,
            &current,
            current.balance + params.amount,
            current.total_earned + params.amount,
            current.total_spent,
        )
        .await?;
        if written.is_some() {
            store::finalize_transaction(db, &txn.id, TransactionStatus::Completed).await?;
            return Ok(LedgerTransaction {
                status: TransactionStatus::Completed,
                ..txn
            });
        }
    }

    store::fail_transaction(db, &txn.id).await?;
    Err(LedgerError::Contention)
}

// ─── Debit ───────────────────────────────────────────────────────

/// Parameters for debiting tokens from an account.
#[derive(Debug, Clone)]
pub struct DebitParams {
    pub user_id: String,
    /// Positive amount in smallest UNITY units.
    pub amount: i64,
    pub kind: TransactionKind,
    pub description: String,
    pub external_ref: Option<String>,
}

/// Debit tokens from a user's account. Fails with `InsufficientBalance`
/// rather than ever writing a negative balance.
pub async fn debit(ctx: &Arc<LedgerContext>, params: DebitParams) -> Result<LedgerTransaction> {
    debit_on(ctx.db(), ctx.options.max_version_retries, params).await
}

pub(crate) async fn debit_on(
    db: &dyn Adapter,
    max_retries: u32,
    params: DebitParams,
) -> Result<LedgerTransaction> {
    if params.amount <= 0 {
        return Err(LedgerError::InvalidAmount);
    }

    let txn = LedgerTransaction {
        id: generate_id(),
        user_id: params.user_id.clone(),
        amount: -params.amount,
        kind: params.kind,
        description: params.description,
        status: TransactionStatus::Pending,
        external_ref: params.external_ref.clone(),
        created_at: Utc::now(),
    };

    let txn = match store::insert_transaction(db, &txn).await {
        Ok(txn) => txn,
        Err(LedgerError::Duplicate(_)) => {
            if let Some(ref external_ref) = params.external_ref {
                if let Some(existing) = store::find_transaction_by_ref(db, external_ref).await? {
                    if existing.status == TransactionStatus::Completed {
                        return Ok(existing);
                    }
                }
            }
            return Err(LedgerError::Duplicate(
                "ledger_transaction.external_ref".into(),
            ));
        }
        Err(e) => return Err(e),
    };

    for _ in 0..=max_retries {
        let current = store::ensure_balance(db, &params.user_id).await?;

        // The funds check runs against the same snapshot the conditional
        // write pins, so a stale read can never overdraw: either the version
        // still holds and the check was accurate, or the write misses.
        if current.balance < params.amount {
            store::fail_transaction(db, &txn.id).await?;
            return Err(LedgerError::InsufficientBalance);
        }

        let written = store::write_balance(
            db,
            &current,
            current.balance - params.amount,
            current.total_earned,
            current.total_spent + params.amount,
        )
        .await?;
        if written.is_some() {
            store::finalize_transaction(db, &txn.id, TransactionStatus::Completed).await?;
            return Ok(LedgerTransaction {
                status: TransactionStatus::Completed,
                ..txn
            });
        }
    }

    store::fail_transaction(db, &txn.id).await?;
    Err(LedgerError::Contention)
}

// ─── Transfer ────────────────────────────────────────────────────

/// A completed peer-to-peer transfer: the debit leg and the credit leg.
#[derive(Debug, Clone, Serialize)]
pub struct Transfer {
    pub out_transaction: LedgerTransaction,
    pub in_transaction: LedgerTransaction,
}

/// Transfer tokens between two users.
///
/// Both legs run inside one storage transaction, so no observer ever sees
/// the debit without the credit. The sender needs sufficient balance; the
/// recipient must exist as a distinct, non-empty user id.
pub async fn transfer(
    ctx: &Arc<LedgerContext>,
    from_user_id: &str,
    to_user_id: &str,
    amount: i64,
    description: Option<String>,
) -> Result<Transfer> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if to_user_id.is_empty() {
        return Err(LedgerError::InvalidRecipient("recipient is empty".into()));
    }
    if from_user_id == to_user_id {
        return Err(LedgerError::InvalidRecipient(
            "cannot transfer to yourself".into(),
        ));
    }

    let description =
        description.unwrap_or_else(|| format!("transfer from {from_user_id} to {to_user_id}"));

    // Both legs run on a fresh snapshot each attempt. Commit re-validates the
    // version-conditioned writes against the live store, so a concurrent
    // writer makes the whole unit retry instead of losing either side.
    for _ in 0..=ctx.options.max_version_retries {
        let tx = ctx.adapter.begin_transaction().await?;
        let db: &dyn Adapter = tx.as_ref();

        let out_transaction = match debit_on(
            db,
            ctx.options.max_version_retries,
            DebitParams {
                user_id: from_user_id.to_string(),
                amount,
                kind: TransactionKind::TransferOut,
                description: description.clone(),
                external_ref: None,
            },
        )
        .await
        {
            Ok(txn) => txn,
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };

        let in_transaction = match credit_on(
            db,
            ctx.options.max_version_retries,
            CreditParams {
                user_id: to_user_id.to_string(),
                amount,
                kind: TransactionKind::TransferIn,
                description: description.clone(),
                external_ref: None,
            },
        )
        .await
        {
            Ok(txn) => txn,
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };

        match tx.commit().await {
            Ok(()) => {
                tracing::info!(
                    from = from_user_id,
                    to = to_user_id,
                    amount,
                    "transfer committed"
                );
                return Ok(Transfer {
                    out_transaction,
                    in_transaction,
                });
            }
            // A balance row created concurrently surfaces as a duplicate at
            // commit; a fresh snapshot picks it up, so both count as conflict.
            Err(LedgerError::Contention) | Err(LedgerError::Duplicate(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(LedgerError::Contention)
}

// ─── Queries ─────────────────────────────────────────────────────

/// A user's current balance, creating the zero row on first sight.
pub async fn get_balance(ctx: &Arc<LedgerContext>, user_id: &str) -> Result<AccountBalance> {
    store::ensure_balance(ctx.db(), user_id).await
}

/// A page of a user's transaction history, newest first.
pub async fn history(
    ctx: &Arc<LedgerContext>,
    user_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<LedgerTransaction>> {
    store::list_transactions(ctx.db(), user_id, limit.clamp(1, 100), offset.max(0)).await
}

/// Result of reconciling a stored balance against its transaction log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceAudit {
    pub user_id: String,
    pub stored_balance: i64,
    /// Sum of signed amounts across completed transactions.
    pub computed_balance: i64,
    pub consistent: bool,
}

/// Recompute a user's balance from the transaction log and compare with the
/// stored row. Inconsistency means a bug, not user error; it is reported,
/// never auto-corrected.
pub async fn audit_balance(ctx: &Arc<LedgerContext>, user_id: &str) -> Result<BalanceAudit> {
    let stored = store::ensure_balance(ctx.db(), user_id).await?;
    let transactions = store::list_completed_transactions(ctx.db(), user_id).await?;
    let computed_balance: i64 = transactions.iter().map(|t| t.amount).sum();

    let audit = BalanceAudit {
        user_id: user_id.to_string(),
        stored_balance: stored.balance,
        computed_balance,
        consistent: stored.balance == computed_balance,
    };
    if !audit.consistent {
        tracing::error!(
            user_id,
            stored = audit.stored_balance,
            computed = audit.computed_balance,
            "balance does not match transaction log"
        );
    }
    Ok(audit)
}

/// Grant the one-time onboarding bonus, if configured. Idempotent per user
/// via the `onboarding:<user_id>` ref; returns `None` when the bonus is
/// disabled or already granted.
pub async fn grant_onboarding_bonus(
    ctx: &Arc<LedgerContext>,
    user_id: &str,
) -> Result<Option<LedgerTransaction>> {
    if ctx.options.onboarding_bonus <= 0 {
        return Ok(None);
    }

    let external_ref = format!("onboarding:{user_id}");
    if let Some(existing) = store::find_transaction_by_ref(ctx.db(), &external_ref).await? {
        return Ok(Some(existing));
    }

    let txn = credit(
        ctx,
        CreditParams {
            user_id: user_id.to_string(),
            amount: ctx.options.onboarding_bonus,
            kind: TransactionKind::OnboardingBonus,
            description: "welcome bonus".into(),
            external_ref: Some(external_ref),
        },
    )
    .await?;
    Ok(Some(txn))
}
