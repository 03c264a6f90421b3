// Typed store operations on top of the raw adapter.
//
// Higher-level database operations built over the schema-agnostic `Adapter`
// trait: each function converts between the typed row models and the JSON
// rows the adapter traffics in. Every function takes `&dyn Adapter` so the
// same code runs against the plain adapter or a transaction adapter.

use chrono::Utc;

use unity_ledger_core::db::adapter::{
    Adapter, FindManyQuery, Operator, SortBy, SortDirection, WhereClause,
};
use unity_ledger_core::db::models::{
    from_value, to_value, AccountBalance, LedgerTransaction, PaymentSession,
    PaymentSessionStatus, ReferralLink, Subscription, SubscriptionStatus, TransactionStatus,
};
use unity_ledger_core::error::Result;

// ─── Balances ────────────────────────────────────────────────────

/// Find a user's balance row.
pub async fn find_balance(db: &dyn Adapter, user_id: &str) -> Result<Option<AccountBalance>> {
    let row = db
        .find_one("balance", &[WhereClause::eq("user_id", user_id)])
        .await?;
    row.map(from_value).transpose()
}

/// Find a user's balance row, creating a zero row on first sight.
pub async fn ensure_balance(db: &dyn Adapter, user_id: &str) -> Result<AccountBalance> {
    if let Some(balance) = find_balance(db, user_id).await? {
        return Ok(balance);
    }

    let fresh = AccountBalance::zero(user_id);
    match db.create("balance", to_value(&fresh)?).await {
        Ok(row) => from_value(row),
        // Lost the insert race: another writer created the row first.
        Err(unity_ledger_core::error::LedgerError::Duplicate(_)) => {
            match find_balance(db, user_id).await? {
                Some(balance) => Ok(balance),
                None => Err(unity_ledger_core::error::LedgerError::Storage(
                    "balance row vanished after duplicate insert".into(),
                )),
            }
        }
        Err(e) => Err(e),
    }
}

/// Conditionally write a balance: the WHERE clause pins the version read
/// earlier, so a concurrent writer makes this return `None` instead of
/// clobbering. The caller re-reads and retries.
pub async fn write_balance(
    db: &dyn Adapter,
    current: &AccountBalance,
    balance: i64,
    total_earned: i64,
    total_spent: i64,
) -> Result<Option<AccountBalance>> {
    let updated = db
        .update(
            "balance",
            &[
                WhereClause::eq("user_id", current.user_id.clone()),
                WhereClause::eq("version", current.version),
            ],
            serde_json::json!({
                "balance": balance,
                "total_earned": total_earned,
                "total_spent": total_spent,
                "version": current.version + 1,
                "updated_at": Utc::now(),
            }),
        )
        .await?;
    updated.map(from_value).transpose()
}

// ─── Ledger Transactions ─────────────────────────────────────────

/// Insert a transaction row. A unique-field violation on `external_ref`
/// surfaces as `LedgerError::Duplicate` — the idempotency guard.
pub async fn insert_transaction(
    db: &dyn Adapter,
    txn: &LedgerTransaction,
) -> Result<LedgerTransaction> {
    let row = db.create("ledger_transaction", to_value(txn)?).await?;
    from_value(row)
}

/// Move a transaction to a terminal status.
pub async fn finalize_transaction(
    db: &dyn Adapter,
    id: &str,
    status: TransactionStatus,
) -> Result<()> {
    db.update(
        "ledger_transaction",
        &[WhereClause::eq("id", id)],
        serde_json::json!({ "status": status }),
    )
    .await?;
    Ok(())
}

/// Mark a transaction failed and release its `external_ref` so a later
/// legitimate retry of the same event can claim the keyspace again.
pub async fn fail_transaction(db: &dyn Adapter, id: &str) -> Result<()> {
    db.update(
        "ledger_transaction",
        &[WhereClause::eq("id", id)],
        serde_json::json!({
            "status": TransactionStatus::Failed,
            "external_ref": serde_json::Value::Null,
        }),
    )
    .await?;
    Ok(())
}

/// Find a transaction by its idempotency key.
pub async fn find_transaction_by_ref(
    db: &dyn Adapter,
    external_ref: &str,
) -> Result<Option<LedgerTransaction>> {
    let row = db
        .find_one(
            "ledger_transaction",
            &[WhereClause::eq("external_ref", external_ref)],
        )
        .await?;
    row.map(from_value).transpose()
}

/// A user's transaction history, newest first.
pub async fn list_transactions(
    db: &dyn Adapter,
    user_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<LedgerTransaction>> {
    let rows = db
        .find_many(
            "ledger_transaction",
            FindManyQuery {
                where_clauses: vec![WhereClause::eq("user_id", user_id)],
                limit: Some(limit),
                offset: Some(offset),
                sort_by: Some(SortBy {
                    field: "created_at".into(),
                    direction: SortDirection::Desc,
                }),
            },
        )
        .await?;
    rows.into_iter().map(from_value).collect()
}

/// All completed transactions for a user (for balance auditing).
pub async fn list_completed_transactions(
    db: &dyn Adapter,
    user_id: &str,
) -> Result<Vec<LedgerTransaction>> {
    let rows = db
        .find_many(
            "ledger_transaction",
            FindManyQuery {
                where_clauses: vec![
                    WhereClause::eq("user_id", user_id),
                    WhereClause::eq("status", serde_json::json!(TransactionStatus::Completed)),
                ],
                ..Default::default()
            },
        )
        .await?;
    rows.into_iter().map(from_value).collect()
}

// ─── Payment Sessions ────────────────────────────────────────────

pub async fn insert_session(db: &dyn Adapter, session: &PaymentSession) -> Result<PaymentSession> {
    let row = db.create("payment_session", to_value(session)?).await?;
    from_value(row)
}

pub async fn find_session(db: &dyn Adapter, id: &str) -> Result<Option<PaymentSession>> {
    let row = db
        .find_one("payment_session", &[WhereClause::eq("id", id)])
        .await?;
    row.map(from_value).transpose()
}

/// Look a session up by the provider-assigned payment id — the key every
/// webhook callback carries.
pub async fn find_session_by_payment_id(
    db: &dyn Adapter,
    provider_payment_id: &str,
) -> Result<Option<PaymentSession>> {
    let row = db
        .find_one(
            "payment_session",
            &[WhereClause::eq("provider_payment_id", provider_payment_id)],
        )
        .await?;
    row.map(from_value).transpose()
}

pub async fn update_session_status(
    db: &dyn Adapter,
    id: &str,
    status: PaymentSessionStatus,
) -> Result<()> {
    db.update(
        "payment_session",
        &[WhereClause::eq("id", id)],
        serde_json::json!({ "status": status }),
    )
    .await?;
    Ok(())
}

/// Attach the crediting ledger transaction and mark the session completed in
/// one write.
pub async fn complete_session(
    db: &dyn Adapter,
    id: &str,
    ledger_transaction_id: &str,
) -> Result<()> {
    db.update(
        "payment_session",
        &[WhereClause::eq("id", id)],
        serde_json::json!({
            "status": PaymentSessionStatus::Completed,
            "ledger_transaction_id": ledger_transaction_id,
        }),
    )
    .await?;
    Ok(())
}

/// Mark every pending or confirming session past its deadline as expired;
/// returns the count. Expired is advisory, not terminal — a late webhook
/// still settles.
pub async fn expire_sessions_before(
    db: &dyn Adapter,
    cutoff: chrono::DateTime<Utc>,
) -> Result<i64> {
    db.update_many(
        "payment_session",
        &[
            WhereClause::with_op(
                "status",
                Operator::In,
                serde_json::json!([
                    PaymentSessionStatus::Pending,
                    PaymentSessionStatus::Confirming,
                ]),
            ),
            WhereClause::with_op("expires_at", Operator::Lt, serde_json::json!(cutoff)),
        ],
        serde_json::json!({ "status": PaymentSessionStatus::Expired }),
    )
    .await
}

// ─── Subscriptions ───────────────────────────────────────────────

pub async fn insert_subscription(
    db: &dyn Adapter,
    subscription: &Subscription,
) -> Result<Subscription> {
    let row = db.create("subscription", to_value(subscription)?).await?;
    from_value(row)
}

pub async fn find_active_subscription(
    db: &dyn Adapter,
    user_id: &str,
) -> Result<Option<Subscription>> {
    let row = db
        .find_one(
            "subscription",
            &[
                WhereClause::eq("user_id", user_id),
                WhereClause::eq("status", serde_json::json!(SubscriptionStatus::Active)),
            ],
        )
        .await?;
    row.map(from_value).transpose()
}

/// Mark all of a user's active subscriptions inactive; returns the count.
pub async fn deactivate_subscriptions(db: &dyn Adapter, user_id: &str) -> Result<i64> {
    db.update_many(
        "subscription",
        &[
            WhereClause::eq("user_id", user_id),
            WhereClause::eq("status", serde_json::json!(SubscriptionStatus::Active)),
        ],
        serde_json::json!({ "status": SubscriptionStatus::Inactive }),
    )
    .await
}

// ─── Referral Links ──────────────────────────────────────────────

pub async fn insert_referral_link(db: &dyn Adapter, link: &ReferralLink) -> Result<ReferralLink> {
    let row = db.create("referral_link", to_value(link)?).await?;
    from_value(row)
}

/// The referral link that brought a user in, if any.
pub async fn find_referral_by_referred(
    db: &dyn Adapter,
    referred_id: &str,
) -> Result<Option<ReferralLink>> {
    let row = db
        .find_one("referral_link", &[WhereClause::eq("referred_id", referred_id)])
        .await?;
    row.map(from_value).transpose()
}

/// Record a paid-out commission on the link.
pub async fn mark_commission_paid(
    db: &dyn Adapter,
    link_id: &str,
    commission_amount: i64,
) -> Result<()> {
    db.update(
        "referral_link",
        &[WhereClause::eq("id", link_id)],
        serde_json::json!({
            "commission_paid": true,
            "commission_amount": commission_amount,
            "status": unity_ledger_core::db::models::ReferralStatus::Completed,
        }),
    )
    .await?;
    Ok(())
}
