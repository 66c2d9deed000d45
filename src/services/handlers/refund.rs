use {
    super::{Handled, HandlerContext, HandlerResult, ack_payment_not_found},
    crate::{
        domain::{
            error::WebhookError,
            event::RefundData,
            payment::{RefundAggregateUpdate, refund_target_status},
            ports::{ProviderCharge, resolve_by_charge_or_fallback},
        },
        services::side_effects::SideEffect,
    },
    serde_json::Value,
};

/// `refund.created` precedes `charge.refunded`, which carries the
/// authoritative aggregate; nothing to do yet.
pub fn handle_created(cx: &HandlerContext<'_>, object: &Value) -> Handled {
    let refund_id = object.get("id").and_then(Value::as_str).unwrap_or("unknown");
    tracing::info!(event_id = %cx.event_id, refund_id, "refund created, acknowledging");
    Handled::untouched()
}

/// `refund.updated`: only reversals matter. A refund moving to `canceled`
/// or `failed` means an aggregate we may already have applied is no longer
/// true, so resync from the provider's charge with demotion allowed.
pub async fn handle_updated(cx: &HandlerContext<'_>, object: &Value) -> HandlerResult {
    let data = RefundData::from_object(object)?;

    match data.status.as_deref() {
        Some("canceled") | Some("failed") => resync_from_refund(cx, &data).await,
        other => {
            tracing::info!(
                event_id = %cx.event_id,
                refund_id = %data.id,
                status = ?other,
                "refund update carries no reversal, acknowledging"
            );
            Ok(Handled::untouched())
        }
    }
}

/// `refund.failed` is a reversal regardless of the carried status.
pub async fn handle_failed(cx: &HandlerContext<'_>, object: &Value) -> HandlerResult {
    let data = RefundData::from_object(object)?;
    resync_from_refund(cx, &data).await
}

async fn resync_from_refund(cx: &HandlerContext<'_>, data: &RefundData) -> HandlerResult {
    let charge_id = data
        .charge
        .as_deref()
        .ok_or_else(|| WebhookError::InvalidPayload {
            reason: "missing_charge".to_string(),
        })?;

    tracing::info!(
        event_id = %cx.event_id,
        refund_id = %data.id,
        charge_id,
        "refund reversed, resyncing aggregate from charge"
    );
    sync_refund_aggregate_by_charge_id(cx, charge_id, true).await
}

/// Re-retrieve the charge and reapply the refund aggregate from it. With
/// `allow_demotion`, a fully-reversed refund drops `refunded` back to
/// `paid`, the one demoting write in the system. Provider errors propagate
/// (retryable): a resync that cannot see the provider has nothing to apply.
pub async fn sync_refund_aggregate_by_charge_id(
    cx: &HandlerContext<'_>,
    charge_id: &str,
    allow_demotion: bool,
) -> HandlerResult {
    let charge = cx.gateway.retrieve_charge(charge_id).await?;
    apply_refund_aggregate_from_charge(cx, &charge, allow_demotion).await
}

pub async fn apply_refund_aggregate_from_charge(
    cx: &HandlerContext<'_>,
    charge: &ProviderCharge,
    allow_demotion: bool,
) -> HandlerResult {
    let resolved = resolve_by_charge_or_fallback(
        cx.payments,
        charge.payment_intent_id.as_deref(),
        &charge.id,
        None,
    )
    .await?;
    let Some(payment) = resolved else {
        return Ok(ack_payment_not_found(cx, "refund_resync"));
    };

    let total_refunded = charge.amount_refunded;

    let fee_id = charge
        .application_fee_id
        .clone()
        .or_else(|| payment.application_fee_id.clone());
    let (fee_refunded, fee_refund_id) = match fee_id {
        Some(fee_id) => {
            let total = cx.gateway.sum_application_fee_refunds(&fee_id).await?;
            (total.amount, total.latest_refund_id)
        }
        None => (0, None),
    };

    let target = refund_target_status(total_refunded, payment.amount, payment.status, allow_demotion);

    cx.payments
        .update_refund_aggregate(
            &RefundAggregateUpdate {
                payment_id: payment.id,
                status: target,
                refunded_amount: total_refunded,
                application_fee_refunded_amount: fee_refunded,
                application_fee_refund_id: fee_refund_id,
            },
            &cx.stamp(),
        )
        .await?;

    tracing::info!(
        event_id = %cx.event_id,
        payment_id = %payment.id,
        refunded_amount = total_refunded,
        status = %target,
        allow_demotion,
        "refund aggregate resynced from provider charge"
    );

    cx.side_effects.dispatch(SideEffect::RegenerateSettlement {
        payment_id: payment.id,
        attendance_id: payment.attendance_id,
    });

    Ok(Handled::payment(payment.id))
}
