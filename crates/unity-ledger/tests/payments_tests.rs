// Payment flow integration tests: session creation, webhook reconciliation,
// subscription activation, and referral commissions.

mod common;

use std::sync::atomic::Ordering;

use unity_ledger::ledger;
use unity_ledger::payments::sessions::{
    self, CreateCryptoSession, CreateTokenSession,
};
use unity_ledger::payments::webhook::{handle_provider_callback, CallbackOutcome};
use unity_ledger::referral;
use unity_ledger::store;
use unity_ledger::subscription;
use unity_ledger::{
    BillingInterval, CallbackStatus, LedgerError, LedgerTransaction, PaymentSessionStatus,
    ProviderCallback, TransactionKind, TransactionStatus,
};

use common::test_ctx;

fn pending_claim(id: &str, user_id: &str, amount: i64, external_ref: &str) -> LedgerTransaction {
    LedgerTransaction {
        id: id.into(),
        user_id: user_id.into(),
        amount,
        kind: TransactionKind::Payment,
        description: "in-flight settlement".into(),
        status: TransactionStatus::Pending,
        external_ref: Some(external_ref.into()),
        created_at: chrono::Utc::now(),
    }
}

fn crypto_session(user_id: &str) -> CreateCryptoSession {
    CreateCryptoSession {
        user_id: user_id.into(),
        plan_id: "basic".into(),
        interval: BillingInterval::Monthly,
        pay_currency: "btc".into(),
    }
}

fn finished(payment_id: &str, pay_amount: f64) -> ProviderCallback {
    ProviderCallback {
        payment_id: payment_id.into(),
        status: CallbackStatus::Finished,
        pay_amount,
    }
}

// ─── Crypto Sessions ─────────────────────────────────────────────

#[tokio::test]
async fn crypto_session_opens_without_touching_ledger() {
    let (ctx, _) = test_ctx().await;

    let session = sessions::create_crypto_session(&ctx, crypto_session("u1"))
        .await
        .unwrap();
    assert_eq!(session.payment_id, "mp_0");
    assert!(!session.pay_address.is_empty());

    let status = sessions::get_session_status(&ctx, &session.session_id)
        .await
        .unwrap();
    assert_eq!(status.status, PaymentSessionStatus::Pending);

    // No credit until the webhook says finished
    let balance = ledger::get_balance(&ctx, "u1").await.unwrap();
    assert_eq!(balance.balance, 0);
}

#[tokio::test]
async fn unknown_plan_rejected_before_provider_call() {
    let (ctx, provider) = test_ctx().await;
    provider.fail_create.store(true, Ordering::SeqCst);

    let err = sessions::create_crypto_session(
        &ctx,
        CreateCryptoSession {
            plan_id: "enterprise".into(),
            ..crypto_session("u1")
        },
    )
    .await
    .unwrap_err();
    // PlanNotFound, not ProviderUnavailable: the plan check runs first
    assert!(matches!(err, LedgerError::PlanNotFound(_)));
}

#[tokio::test]
async fn provider_outage_leaves_no_session() {
    let (ctx, provider) = test_ctx().await;
    provider.fail_create.store(true, Ordering::SeqCst);

    let err = sessions::create_crypto_session(&ctx, crypto_session("u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::ProviderUnavailable(_)));
    assert!(err.is_transient());
}

// ─── Webhook Settlement ──────────────────────────────────────────

#[tokio::test]
async fn finished_webhook_credits_and_activates() {
    let (ctx, _) = test_ctx().await;

    let session = sessions::create_crypto_session(&ctx, crypto_session("u1"))
        .await
        .unwrap();

    let outcome = handle_provider_callback(&ctx, finished(&session.payment_id, 20.0))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Settled);

    // $20 at 8.5 UNITY/USD
    let balance = ledger::get_balance(&ctx, "u1").await.unwrap();
    assert_eq!(balance.balance, 170);

    let txns = ledger::history(&ctx, "u1", 10, 0).await.unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].kind, TransactionKind::Payment);
    assert_eq!(txns[0].external_ref.as_deref(), Some(session.payment_id.as_str()));

    let status = sessions::get_session_status(&ctx, &session.session_id)
        .await
        .unwrap();
    assert_eq!(status.status, PaymentSessionStatus::Completed);
    assert_eq!(status.ledger_transaction_id.as_deref(), Some(txns[0].id.as_str()));

    let sub = subscription::get_active(&ctx, "u1").await.unwrap().unwrap();
    assert_eq!(sub.plan_id, "basic");

    // Follow-up work was drained, not left sitting in the queue
    assert_eq!(ctx.settlement.pending_count().await, 0);
}

#[tokio::test]
async fn redelivery_during_inflight_settlement_is_rejected_then_retried() {
    let (ctx, _) = test_ctx().await;
    let session = sessions::create_crypto_session(&ctx, crypto_session("u1"))
        .await
        .unwrap();

    // A first delivery claimed the payment id but stalled before completing
    let claim = pending_claim("t_stalled", "u1", 170, &session.payment_id);
    store::insert_transaction(ctx.db(), &claim).await.unwrap();

    // The redelivery must not ack: the stalled claimant may yet fail
    let err = handle_provider_callback(&ctx, finished(&session.payment_id, 20.0))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Duplicate(_)));

    let status = sessions::get_session_status(&ctx, &session.session_id)
        .await
        .unwrap();
    assert!(!status.status.is_terminal());
    let balance = ledger::get_balance(&ctx, "u1").await.unwrap();
    assert_eq!(balance.balance, 0);

    // The claimant fails and releases the payment id; the next redelivery
    // claims it afresh and settles for real
    store::fail_transaction(ctx.db(), "t_stalled").await.unwrap();
    let outcome = handle_provider_callback(&ctx, finished(&session.payment_id, 20.0))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Settled);

    let balance = ledger::get_balance(&ctx, "u1").await.unwrap();
    assert_eq!(balance.balance, 170);
    let status = sessions::get_session_status(&ctx, &session.session_id)
        .await
        .unwrap();
    assert_eq!(status.status, PaymentSessionStatus::Completed);
}

#[tokio::test]
async fn webhook_replays_credit_exactly_once() {
    let (ctx, _) = test_ctx().await;
    let session = sessions::create_crypto_session(&ctx, crypto_session("u1"))
        .await
        .unwrap();

    let first = handle_provider_callback(&ctx, finished(&session.payment_id, 20.0))
        .await
        .unwrap();
    assert_eq!(first, CallbackOutcome::Settled);

    for _ in 0..3 {
        let replay = handle_provider_callback(&ctx, finished(&session.payment_id, 20.0))
            .await
            .unwrap();
        assert_eq!(replay, CallbackOutcome::AlreadySettled);
    }

    let balance = ledger::get_balance(&ctx, "u1").await.unwrap();
    assert_eq!(balance.balance, 170);
    let audit = ledger::audit_balance(&ctx, "u1").await.unwrap();
    assert!(audit.consistent);
}

#[tokio::test]
async fn unknown_payment_id_is_ignored() {
    let (ctx, _) = test_ctx().await;
    let outcome = handle_provider_callback(&ctx, finished("mp_does_not_exist", 20.0))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Ignored);
}

#[tokio::test]
async fn confirming_then_finished() {
    let (ctx, _) = test_ctx().await;
    let session = sessions::create_crypto_session(&ctx, crypto_session("u1"))
        .await
        .unwrap();

    let outcome = handle_provider_callback(
        &ctx,
        ProviderCallback {
            payment_id: session.payment_id.clone(),
            status: CallbackStatus::Confirming,
            pay_amount: 20.0,
        },
    )
    .await
    .unwrap();
    assert_eq!(outcome, CallbackOutcome::Acknowledged);
    let status = sessions::get_session_status(&ctx, &session.session_id)
        .await
        .unwrap();
    assert_eq!(status.status, PaymentSessionStatus::Confirming);

    let outcome = handle_provider_callback(&ctx, finished(&session.payment_id, 20.0))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Settled);
}

#[tokio::test]
async fn failed_payment_closes_session_without_credit() {
    let (ctx, _) = test_ctx().await;
    let session = sessions::create_crypto_session(&ctx, crypto_session("u1"))
        .await
        .unwrap();

    let outcome = handle_provider_callback(
        &ctx,
        ProviderCallback {
            payment_id: session.payment_id.clone(),
            status: CallbackStatus::Failed,
            pay_amount: 0.0,
        },
    )
    .await
    .unwrap();
    assert_eq!(outcome, CallbackOutcome::MarkedFailed);

    let balance = ledger::get_balance(&ctx, "u1").await.unwrap();
    assert_eq!(balance.balance, 0);

    // Failed is terminal: a late finished callback is swallowed
    let late = handle_provider_callback(&ctx, finished(&session.payment_id, 20.0))
        .await
        .unwrap();
    assert_eq!(late, CallbackOutcome::AlreadySettled);
}

#[tokio::test]
async fn waiting_and_unknown_statuses_leave_session_untouched() {
    let (ctx, _) = test_ctx().await;
    let session = sessions::create_crypto_session(&ctx, crypto_session("u1"))
        .await
        .unwrap();

    for status in [CallbackStatus::Waiting, CallbackStatus::Unknown] {
        let outcome = handle_provider_callback(
            &ctx,
            ProviderCallback {
                payment_id: session.payment_id.clone(),
                status,
                pay_amount: 0.0,
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome, CallbackOutcome::Ignored);
    }

    let status = sessions::get_session_status(&ctx, &session.session_id)
        .await
        .unwrap();
    assert_eq!(status.status, PaymentSessionStatus::Pending);
}

#[tokio::test]
async fn late_webhook_settles_expired_session() {
    let (ctx, _) = test_ctx().await;
    let session = sessions::create_crypto_session(&ctx, crypto_session("u1"))
        .await
        .unwrap();

    // Force the sweep to catch the session by moving its deadline back
    unity_ledger::Adapter::update(
        ctx.db(),
        "payment_session",
        &[unity_ledger_core::db::adapter::WhereClause::eq(
            "id",
            session.session_id.clone(),
        )],
        serde_json::json!({ "expires_at": chrono::Utc::now() - chrono::Duration::hours(1) }),
    )
    .await
    .unwrap();

    let swept = sessions::expire_stale_sessions(&ctx).await.unwrap();
    assert_eq!(swept, 1);
    let status = sessions::get_session_status(&ctx, &session.session_id)
        .await
        .unwrap();
    assert_eq!(status.status, PaymentSessionStatus::Expired);

    // Expired is advisory: the customer's funds arrived late, credit anyway
    let outcome = handle_provider_callback(&ctx, finished(&session.payment_id, 20.0))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Settled);
    let balance = ledger::get_balance(&ctx, "u1").await.unwrap();
    assert_eq!(balance.balance, 170);
}

#[tokio::test]
async fn poll_session_reconciles_like_a_webhook() {
    let (ctx, provider) = test_ctx().await;
    let session = sessions::create_crypto_session(&ctx, crypto_session("u1"))
        .await
        .unwrap();

    provider.set_status(&session.payment_id, CallbackStatus::Finished, 20.0);

    let refreshed = sessions::poll_session(&ctx, &session.session_id).await.unwrap();
    assert_eq!(refreshed.status, PaymentSessionStatus::Completed);
    let balance = ledger::get_balance(&ctx, "u1").await.unwrap();
    assert_eq!(balance.balance, 170);
}

// ─── UNITY Token Purchases ───────────────────────────────────────

#[tokio::test]
async fn token_purchase_settles_synchronously() {
    let (ctx, _) = test_ctx().await;
    ledger::credit(
        &ctx,
        unity_ledger::ledger::CreditParams {
            user_id: "u1".into(),
            amount: 200,
            kind: TransactionKind::Credit,
            description: "test grant".into(),
            external_ref: None,
        },
    )
    .await
    .unwrap();

    let result = sessions::create_token_session(
        &ctx,
        CreateTokenSession {
            user_id: "u1".into(),
            plan_id: "basic".into(),
            interval: BillingInterval::Monthly,
        },
    )
    .await
    .unwrap();
    assert_eq!(result.tokens_charged, 170);

    let balance = ledger::get_balance(&ctx, "u1").await.unwrap();
    assert_eq!(balance.balance, 30);

    let status = sessions::get_session_status(&ctx, &result.session_id)
        .await
        .unwrap();
    assert_eq!(status.status, PaymentSessionStatus::Completed);
    assert_eq!(status.provider, "unity");

    let sub = subscription::get_active(&ctx, "u1").await.unwrap().unwrap();
    assert_eq!(sub.id, result.subscription_id);
}

#[tokio::test]
async fn token_purchase_with_insufficient_balance_writes_nothing() {
    let (ctx, _) = test_ctx().await;

    let err = sessions::create_token_session(
        &ctx,
        CreateTokenSession {
            user_id: "u1".into(),
            plan_id: "basic".into(),
            interval: BillingInterval::Monthly,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance));

    assert!(subscription::get_active(&ctx, "u1").await.unwrap().is_none());
}

#[tokio::test]
async fn new_purchase_supersedes_active_subscription() {
    let (ctx, _) = test_ctx().await;
    let s1 = sessions::create_crypto_session(&ctx, crypto_session("u1")).await.unwrap();
    handle_provider_callback(&ctx, finished(&s1.payment_id, 20.0)).await.unwrap();
    let first = subscription::get_active(&ctx, "u1").await.unwrap().unwrap();

    let s2 = sessions::create_crypto_session(&ctx, crypto_session("u1")).await.unwrap();
    handle_provider_callback(&ctx, finished(&s2.payment_id, 20.0)).await.unwrap();
    let second = subscription::get_active(&ctx, "u1").await.unwrap().unwrap();

    assert_ne!(first.id, second.id);
}

// ─── Referral Commissions ────────────────────────────────────────

#[tokio::test]
async fn referrer_earns_commission_once() {
    let (ctx, _) = test_ctx().await;
    referral::register_referral(&ctx, "referrer", "referred").await.unwrap();

    let session = sessions::create_crypto_session(&ctx, crypto_session("referred"))
        .await
        .unwrap();
    handle_provider_callback(&ctx, finished(&session.payment_id, 20.0))
        .await
        .unwrap();

    // 20% of $20 at 8.5 UNITY/USD = 34 tokens
    let referrer = ledger::get_balance(&ctx, "referrer").await.unwrap();
    assert_eq!(referrer.balance, 34);

    // A second settled payment from the same referred user pays nothing more
    let session2 = sessions::create_crypto_session(&ctx, crypto_session("referred"))
        .await
        .unwrap();
    handle_provider_callback(&ctx, finished(&session2.payment_id, 20.0))
        .await
        .unwrap();

    let referrer = ledger::get_balance(&ctx, "referrer").await.unwrap();
    assert_eq!(referrer.balance, 34);

    let txns = ledger::history(&ctx, "referrer", 10, 0).await.unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].kind, TransactionKind::Referral);
}

#[tokio::test]
async fn payment_without_referral_pays_no_commission() {
    let (ctx, _) = test_ctx().await;
    let session = sessions::create_crypto_session(&ctx, crypto_session("loner"))
        .await
        .unwrap();
    handle_provider_callback(&ctx, finished(&session.payment_id, 20.0))
        .await
        .unwrap();

    let txns = ledger::history(&ctx, "loner", 10, 0).await.unwrap();
    assert_eq!(txns.len(), 1); // just the payment credit
}

#[tokio::test]
async fn self_referral_rejected() {
    let (ctx, _) = test_ctx().await;
    assert!(matches!(
        referral::register_referral(&ctx, "u1", "u1").await,
        Err(LedgerError::InvalidRecipient(_))
    ));
}

#[tokio::test]
async fn second_referral_for_same_user_rejected() {
    let (ctx, _) = test_ctx().await;
    referral::register_referral(&ctx, "r1", "newcomer").await.unwrap();
    let err = referral::register_referral(&ctx, "r2", "newcomer")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Duplicate(_)));
}

#[tokio::test]
async fn direct_commission_call_is_idempotent() {
    let (ctx, _) = test_ctx().await;
    let link = referral::register_referral(&ctx, "referrer", "referred")
        .await
        .unwrap();
    assert!(!link.commission_paid);

    let paid = referral::pay_commission(&ctx, "referred", 20.0).await.unwrap();
    assert!(paid.is_some());
    let again = referral::pay_commission(&ctx, "referred", 20.0).await.unwrap();
    assert!(again.is_none());

    let referrer = ledger::get_balance(&ctx, "referrer").await.unwrap();
    assert_eq!(referrer.balance, 34);
}

#[tokio::test]
async fn commission_survives_a_failed_racing_payout() {
    let (ctx, _) = test_ctx().await;
    let link = referral::register_referral(&ctx, "referrer", "referred")
        .await
        .unwrap();

    // Another settlement claimed the payout ref but has not finished
    let claim = pending_claim(
        "t_payout",
        "referrer",
        34,
        &format!("referral:{}", link.id),
    );
    store::insert_transaction(ctx.db(), &claim).await.unwrap();

    // This settlement defers to the in-flight payout without marking paid
    let deferred = referral::pay_commission(&ctx, "referred", 20.0).await.unwrap();
    assert!(deferred.is_none());
    let link = store::find_referral_by_referred(ctx.db(), "referred")
        .await
        .unwrap()
        .unwrap();
    assert!(!link.commission_paid);

    // The racing payout fails; a later settlement still earns the commission
    store::fail_transaction(ctx.db(), "t_payout").await.unwrap();
    let paid = referral::pay_commission(&ctx, "referred", 20.0).await.unwrap();
    assert!(paid.is_some());

    let referrer = ledger::get_balance(&ctx, "referrer").await.unwrap();
    assert_eq!(referrer.balance, 34);
}
