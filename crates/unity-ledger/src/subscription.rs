// Subscription activation.
//
// A settled payment grants plan access for the interval's duration. At most
// one subscription row is active per user: activation deactivates any prior
// rows first, superseded rows are kept for history.

use std::sync::Arc;

use chrono::{Duration, Utc};

use unity_ledger_core::db::models::{Subscription, SubscriptionStatus};
use unity_ledger_core::error::Result;
use unity_ledger_core::options::BillingInterval;
use unity_ledger_core::utils::id::generate_id;

use crate::context::LedgerContext;
use crate::store;

/// Activate a subscription for a user after a settled payment.
///
/// Idempotent enough for at-least-once settlement: re-activation of the same
/// plan supersedes the previous row and grants a fresh period, but the credit
/// guarding it is exactly-once, so this only runs once per payment in
/// practice.
pub async fn activate(
    ctx: &Arc<LedgerContext>,
    user_id: &str,
    plan_id: &str,
    interval: BillingInterval,
    payment_provider: &str,
) -> Result<Subscription> {
    let plan = ctx.options.require_plan(plan_id)?;
    let duration_days = plan.duration_days(interval);

    let superseded = store::deactivate_subscriptions(ctx.db(), user_id).await?;
    if superseded > 0 {
        tracing::debug!(user_id, superseded, "deactivated prior subscriptions");
    }

    let now = Utc::now();
    let subscription = Subscription {
        id: generate_id(),
        user_id: user_id.to_string(),
        plan_id: plan_id.to_string(),
        status: SubscriptionStatus::Active,
        period_start: now,
        period_end: now + Duration::days(duration_days),
        payment_provider: payment_provider.to_string(),
        created_at: now,
    };
    let subscription = store::insert_subscription(ctx.db(), &subscription).await?;

    tracing::info!(
        user_id,
        plan_id,
        period_end = %subscription.period_end,
        "subscription activated"
    );
    Ok(subscription)
}

/// The user's currently active subscription, if any.
pub async fn get_active(ctx: &Arc<LedgerContext>, user_id: &str) -> Result<Option<Subscription>> {
    store::find_active_subscription(ctx.db(), user_id).await
}
