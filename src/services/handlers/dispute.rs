use {
    super::{Handled, HandlerContext, HandlerResult},
    crate::{
        domain::{
            event::DisputeData,
            payment::DisputeUpsert,
            ports::resolve_for_dispute,
            router::DisputeKind,
        },
        services::side_effects::SideEffect,
    },
    chrono::DateTime,
    serde_json::Value,
};

/// `charge.dispute.*`: upsert the dispute record keyed by the provider's
/// dispute id. The record is kept even when no payment resolves, since disputes
/// can reference charges this system never saw. `closed_at` is stamped only
/// on the closed event.
pub async fn handle(cx: &HandlerContext<'_>, kind: DisputeKind, object: &Value) -> HandlerResult {
    let data = DisputeData::from_object(object)?;

    let payment = resolve_for_dispute(
        cx.payments,
        data.payment_intent.as_deref(),
        data.charge.as_deref(),
    )
    .await?;
    let payment_id = payment.as_ref().map(|p| p.id);

    if payment.is_none() {
        tracing::warn!(
            event_id = %cx.event_id,
            dispute_id = %data.id,
            "dispute references no known payment, recording anyway"
        );
    }

    let upsert = DisputeUpsert {
        stripe_dispute_id: data.id.clone(),
        payment_id,
        charge_id: data.charge.clone(),
        payment_intent_id: data.payment_intent.clone(),
        amount: data.amount,
        currency: data
            .currency
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_else(|| "jpy".to_string()),
        reason: data.reason.clone(),
        status: data
            .status
            .clone()
            .unwrap_or_else(|| "needs_response".to_string()),
        evidence_due_by: data
            .evidence_due_by
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        stripe_account_id: cx.account.map(str::to_string),
        closed_at: (kind == DisputeKind::Closed).then_some(cx.now),
    };

    cx.disputes.upsert(&upsert, &cx.stamp()).await?;

    tracing::info!(
        event_id = %cx.event_id,
        dispute_id = %data.id,
        status = %upsert.status,
        kind = ?kind,
        "dispute record upserted"
    );

    if let Some(payment) = payment {
        cx.side_effects.dispatch(SideEffect::RegenerateSettlement {
            payment_id: payment.id,
            attendance_id: payment.attendance_id,
        });
        return Ok(Handled::payment(payment.id));
    }
    Ok(Handled::untouched())
}
