// Referral commission engine.
//
// When a referred user's payment settles, the referrer earns a commission:
// a fixed fraction of the fiat amount, converted to UNITY at the configured
// rate. The payout is once per referral link, enforced two ways: the
// `commission_paid` flag short-circuits the common case, and the credit's
// `referral:<link_id>` external_ref makes the payout exactly-once even when
// two settlements race past the flag check.

use std::sync::Arc;

use chrono::Utc;

use unity_ledger_core::db::models::{LedgerTransaction, ReferralLink, ReferralStatus, TransactionKind};
use unity_ledger_core::error::{LedgerError, Result};
use unity_ledger_core::utils::id::generate_id;

use crate::context::LedgerContext;
use crate::ledger::{self, CreditParams};
use crate::store;

/// Record that `referrer_id` brought `referred_id` onto the platform.
/// One link per referred user; a second registration is rejected.
pub async fn register_referral(
    ctx: &Arc<LedgerContext>,
    referrer_id: &str,
    referred_id: &str,
) -> Result<ReferralLink> {
    if referrer_id == referred_id {
        return Err(LedgerError::InvalidRecipient(
            "cannot refer yourself".into(),
        ));
    }

    let link = ReferralLink {
        id: generate_id(),
        referrer_id: referrer_id.to_string(),
        referred_id: referred_id.to_string(),
        status: ReferralStatus::Pending,
        commission_paid: false,
        commission_amount: 0,
        created_at: Utc::now(),
    };
    store::insert_referral_link(ctx.db(), &link).await
}

/// Pay the referral commission for a referred user's settled payment.
///
/// Returns `None` when no link exists or the commission was already paid.
/// The commission is computed from the rate in force now, not at signup.
pub async fn pay_commission(
    ctx: &Arc<LedgerContext>,
    referred_id: &str,
    fiat_amount: f64,
) -> Result<Option<LedgerTransaction>> {
    let link = match store::find_referral_by_referred(ctx.db(), referred_id).await? {
        Some(link) => link,
        None => return Ok(None),
    };
    if link.commission_paid {
        return Ok(None);
    }

    let commission = ctx.options.commission_tokens(fiat_amount);
    if commission <= 0 {
        return Ok(None);
    }

    let external_ref = format!("referral:{}", link.id);
    let txn = match ledger::credit(
        ctx,
        CreditParams {
            user_id: link.referrer_id.clone(),
            amount: commission,
            kind: TransactionKind::Referral,
            description: format!("referral commission for {referred_id}"),
            external_ref: Some(external_ref),
        },
    )
    .await
    {
        Ok(txn) => txn,
        // The ref is claimed by a payout still in flight. If it completes it
        // marks the flag itself; if it fails it releases the ref and a later
        // settlement retries. Marking paid here would forfeit the commission.
        Err(LedgerError::Duplicate(_)) => return Ok(None),
        Err(e) => return Err(e),
    };

    store::mark_commission_paid(ctx.db(), &link.id, commission).await?;

    tracing::info!(
        referrer = %link.referrer_id,
        referred = referred_id,
        commission,
        "referral commission paid"
    );
    Ok(Some(txn))
}
