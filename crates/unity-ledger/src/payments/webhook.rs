// Webhook reconciler.
//
// Providers deliver callbacks at-least-once, out of order, and sometimes for
// payments we know nothing about. The reconciler turns that into exactly-once
// ledger credits:
//
// 1. unknown payment id        -> acknowledged and ignored
// 2. session already terminal  -> acknowledged, nothing to do
// 3. waiting/unknown status    -> acknowledged and ignored
// 4. confirming                -> session moves to confirming
// 5. failed                    -> session moves to failed
// 6. finished                  -> credit (guarded by the payment id as
//                                 external_ref), complete the session,
//                                 activate the subscription, pay referral
//
// The credit is the idempotency anchor: even if two replays race past the
// terminal-status check, only one claims the external_ref. Follow-up work
// (subscription, referral) goes through the settlement queue after the
// ledger writes are durable and must never fail the acknowledgement — a
// lost subscription activation is recoverable, a rejected webhook gets
// redelivered forever.

use std::sync::Arc;

use serde::Serialize;

use unity_ledger_core::db::models::{PaymentSessionStatus, TransactionKind};
use unity_ledger_core::error::Result;
use unity_ledger_core::provider::{CallbackStatus, ProviderCallback};

use crate::context::LedgerContext;
use crate::ledger::{self, CreditParams};
use crate::referral;
use crate::store;
use crate::subscription;

/// What the reconciler did with a callback. Every variant acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// Unknown payment id or a status we do not act on.
    Ignored,
    /// The session was already terminal; replay swallowed.
    AlreadySettled,
    /// Progress recorded (confirming).
    Acknowledged,
    /// The payment failed; session closed without credit.
    MarkedFailed,
    /// The payment finished and tokens were credited.
    Settled,
}

/// Reconcile one provider callback against the ledger.
pub async fn handle_provider_callback(
    ctx: &Arc<LedgerContext>,
    callback: ProviderCallback,
) -> Result<CallbackOutcome> {
    let session = match store::find_session_by_payment_id(ctx.db(), &callback.payment_id).await? {
        Some(session) => session,
        None => {
            tracing::warn!(
                payment_id = %callback.payment_id,
                "callback for unknown payment, ignoring"
            );
            return Ok(CallbackOutcome::Ignored);
        }
    };

    if session.status.is_terminal() {
        tracing::debug!(
            session_id = %session.id,
            status = ?session.status,
            "callback replay for terminal session"
        );
        return Ok(CallbackOutcome::AlreadySettled);
    }

    match callback.status {
        CallbackStatus::Waiting | CallbackStatus::Unknown => Ok(CallbackOutcome::Ignored),

        CallbackStatus::Confirming => {
            store::update_session_status(ctx.db(), &session.id, PaymentSessionStatus::Confirming)
                .await?;
            Ok(CallbackOutcome::Acknowledged)
        }

        CallbackStatus::Failed => {
            store::update_session_status(ctx.db(), &session.id, PaymentSessionStatus::Failed)
                .await?;
            tracing::info!(session_id = %session.id, "payment failed, session closed");
            Ok(CallbackOutcome::MarkedFailed)
        }

        CallbackStatus::Finished => {
            let tokens = ctx.options.fiat_to_unity(callback.pay_amount);
            let txn = ledger::credit(
                ctx,
                CreditParams {
                    user_id: session.user_id.clone(),
                    amount: tokens,
                    kind: TransactionKind::Payment,
                    description: format!("crypto payment for {} plan", session.plan_id),
                    external_ref: Some(callback.payment_id.clone()),
                },
            )
            .await?;

            store::complete_session(ctx.db(), &session.id, &txn.id).await?;

            // Follow-up work runs off the settlement queue once the session
            // is terminal; failures log and never fail the acknowledgement.
            let sub_ctx = ctx.clone();
            let sub_session = session.clone();
            ctx.settlement
                .queue(move || async move {
                    if let Err(e) = subscription::activate(
                        &sub_ctx,
                        &sub_session.user_id,
                        &sub_session.plan_id,
                        sub_session.interval,
                        &sub_session.provider,
                    )
                    .await
                    {
                        tracing::error!(
                            session_id = %sub_session.id,
                            error = %e,
                            "settled payment but failed to activate subscription"
                        );
                    }
                })
                .await;

            let ref_ctx = ctx.clone();
            let ref_session_id = session.id.clone();
            let ref_user_id = session.user_id.clone();
            let fiat_amount = callback.pay_amount;
            ctx.settlement
                .queue(move || async move {
                    if let Err(e) =
                        referral::pay_commission(&ref_ctx, &ref_user_id, fiat_amount).await
                    {
                        tracing::error!(
                            session_id = %ref_session_id,
                            error = %e,
                            "settled payment but failed to pay referral commission"
                        );
                    }
                })
                .await;

            ctx.settlement.drain().await;

            tracing::info!(
                session_id = %session.id,
                payment_id = %callback.payment_id,
                tokens,
                "payment settled and credited"
            );
            Ok(CallbackOutcome::Settled)
        }
    }
}
