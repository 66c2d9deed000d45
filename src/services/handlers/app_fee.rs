use {
    super::{Handled, HandlerContext, HandlerResult, ack_payment_not_found},
    crate::{
        domain::{
            error::WebhookError,
            event::extract_application_fee_id,
            payment::AppFeeRefundAggregateUpdate,
        },
        services::side_effects::SideEffect,
    },
    serde_json::Value,
};

/// `application_fee.refunded` / `application_fee.refund.updated`: recompute
/// the fee-refund aggregate from the provider. The event object is either an
/// `ApplicationFee` or a `FeeRefund` pointing at one; both reduce to the fee
/// id. A provider failure preserves the stored aggregates: never overwrite
/// a known total with zero because a fetch timed out.
pub async fn handle_refund(cx: &HandlerContext<'_>, object: &Value) -> HandlerResult {
    let fee_id =
        extract_application_fee_id(object).ok_or_else(|| WebhookError::InvalidPayload {
            reason: "missing_application_fee".to_string(),
        })?;

    let Some(payment) = cx.payments.find_by_application_fee_id(&fee_id).await? else {
        return Ok(ack_payment_not_found(cx, "application_fee.refunded"));
    };

    let (fee_refunded, fee_refund_id) = match cx.gateway.sum_application_fee_refunds(&fee_id).await
    {
        Ok(total) => (total.amount, total.latest_refund_id),
        Err(e) => {
            tracing::warn!(
                event_id = %cx.event_id,
                payment_id = %payment.id,
                application_fee_id = %fee_id,
                error = %e,
                "fee refund sum failed, preserving stored aggregates"
            );
            (
                payment.application_fee_refunded_amount,
                payment.application_fee_refund_id.clone(),
            )
        }
    };

    cx.payments
        .update_application_fee_refund_aggregate(
            &AppFeeRefundAggregateUpdate {
                payment_id: payment.id,
                application_fee_refunded_amount: fee_refunded,
                application_fee_refund_id: fee_refund_id,
            },
            &cx.stamp(),
        )
        .await?;

    tracing::info!(
        event_id = %cx.event_id,
        payment_id = %payment.id,
        application_fee_id = %fee_id,
        application_fee_refunded_amount = fee_refunded,
        "application fee refund aggregate applied"
    );

    cx.side_effects.dispatch(SideEffect::RegenerateSettlement {
        payment_id: payment.id,
        attendance_id: payment.attendance_id,
    });

    Ok(Handled::payment(payment.id))
}
