use {
    super::{Handled, HandlerContext, HandlerResult, ack_payment_not_found, evaluate_promotion},
    crate::{
        domain::{
            error::WebhookError,
            event::PaymentIntentData,
            ports::resolve_by_payment_intent_or_metadata,
            status::{PaymentStatus, Promotion},
        },
        services::side_effects::SideEffect,
    },
    serde_json::Value,
};

/// `payment_intent.succeeded`: promote to `paid` after cross-checking the
/// event against the stored amount. A mismatched amount or a non-JPY
/// currency means the event belongs to some other ledger; terminal, never
/// retried.
pub async fn handle_succeeded(cx: &HandlerContext<'_>, object: &Value) -> HandlerResult {
    let data = PaymentIntentData::from_object(object)?;

    let resolved = resolve_by_payment_intent_or_metadata(
        cx.payments,
        Some(&data.id),
        data.metadata_payment_id,
    )
    .await?;
    let Some(payment) = resolved else {
        return Ok(ack_payment_not_found(cx, "payment_intent.succeeded"));
    };

    let amount_mismatch = data.amount.is_some_and(|a| a != payment.amount);
    let currency_mismatch = data
        .currency
        .as_deref()
        .is_some_and(|c| !c.eq_ignore_ascii_case("jpy"));
    if amount_mismatch || currency_mismatch {
        tracing::error!(
            event_id = %cx.event_id,
            payment_id = %payment.id,
            event_amount = ?data.amount,
            payment_amount = payment.amount,
            currency = ?data.currency,
            "amount or currency mismatch on payment_intent.succeeded"
        );
        return Err(WebhookError::InvalidPayload {
            reason: "amount_currency_mismatch".to_string(),
        });
    }

    if evaluate_promotion(cx, &payment, PaymentStatus::Paid) != Promotion::Apply {
        return Ok(Handled::untouched());
    }

    cx.payments
        .update_status_paid_from_payment_intent(payment.id, &data.id, &cx.stamp())
        .await?;

    tracing::info!(
        event_id = %cx.event_id,
        payment_id = %payment.id,
        payment_intent_id = %data.id,
        "payment marked paid from payment intent"
    );

    cx.side_effects.dispatch(SideEffect::AggregateRevenue {
        payment_id: payment.id,
    });

    Ok(Handled::payment(payment.id))
}

/// `payment_intent.payment_failed` and `payment_intent.canceled`: promote to
/// `failed` when the rank order allows it.
pub async fn handle_failed(
    cx: &HandlerContext<'_>,
    object: &Value,
    event_type: &str,
) -> HandlerResult {
    let data = PaymentIntentData::from_object(object)?;

    let resolved = resolve_by_payment_intent_or_metadata(
        cx.payments,
        Some(&data.id),
        data.metadata_payment_id,
    )
    .await?;
    let Some(payment) = resolved else {
        return Ok(ack_payment_not_found(cx, event_type));
    };

    if evaluate_promotion(cx, &payment, PaymentStatus::Failed) != Promotion::Apply {
        return Ok(Handled::untouched());
    }

    cx.payments
        .update_status_failed_from_payment_intent(payment.id, &data.id, &cx.stamp())
        .await?;

    tracing::info!(
        event_id = %cx.event_id,
        payment_id = %payment.id,
        event_type,
        "payment marked failed from payment intent"
    );
    Ok(Handled::payment(payment.id))
}
