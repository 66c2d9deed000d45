use {
    super::{Handled, HandlerContext, HandlerResult, ack_payment_not_found, evaluate_promotion},
    crate::{
        domain::{
            error::WebhookError,
            event::ChargeData,
            payment::{ChargeSnapshot, RefundAggregateUpdate, refund_target_status},
            ports::resolve_by_charge_or_fallback,
            status::{PaymentStatus, Promotion},
        },
        services::side_effects::SideEffect,
    },
    serde_json::Value,
};

/// `charge.succeeded`: promote to `paid` carrying the full money snapshot
/// (balance transaction, fees, transfer, application fee). The event object
/// seeds the snapshot; a provider fetch of the payment intent's latest
/// charge enriches it when it succeeds. This is also the canonical place for
/// the payment-completed notification, so a later `payment_intent.succeeded`
/// cannot duplicate it.
pub async fn handle_succeeded(cx: &HandlerContext<'_>, object: &Value) -> HandlerResult {
    let data = ChargeData::from_object(object)?;

    let mut snapshot = ChargeSnapshot {
        charge_id: data.id.clone(),
        payment_intent_id: data.payment_intent.clone(),
        balance_transaction_id: data.balance_transaction.clone(),
        fee_details: None,
        transfer_id: data.transfer.clone(),
        application_fee_id: data.application_fee.clone(),
    };

    if let Some(pi_id) = data.payment_intent.as_deref()
        && let Some(pi) = cx
            .gateway
            .retrieve_payment_intent_with_latest_charge(pi_id)
            .await
        && let Some(latest) = pi.latest_charge
        && latest.id == data.id
    {
        snapshot.balance_transaction_id = latest.balance_transaction_id;
        snapshot.fee_details = latest.fee_details;
        snapshot.transfer_id = latest.transfer_id;
        snapshot.application_fee_id = latest.application_fee_id.or(snapshot.application_fee_id);
    }

    let resolved = resolve_by_charge_or_fallback(
        cx.payments,
        data.payment_intent.as_deref(),
        &data.id,
        data.metadata_payment_id,
    )
    .await?;
    let Some(payment) = resolved else {
        return Ok(ack_payment_not_found(cx, "charge.succeeded"));
    };

    if evaluate_promotion(cx, &payment, PaymentStatus::Paid) != Promotion::Apply {
        return Ok(Handled::untouched());
    }

    cx.payments
        .update_status_paid_from_charge_snapshot(payment.id, &snapshot, &cx.stamp())
        .await?;

    tracing::info!(
        event_id = %cx.event_id,
        payment_id = %payment.id,
        charge_id = %data.id,
        "payment marked paid from charge snapshot"
    );

    cx.side_effects.dispatch(SideEffect::NotifyPaymentCompleted {
        payment_id: payment.id,
    });

    Ok(Handled::payment(payment.id))
}

pub async fn handle_failed(cx: &HandlerContext<'_>, object: &Value) -> HandlerResult {
    let data = ChargeData::from_object(object)?;

    let resolved = resolve_by_charge_or_fallback(
        cx.payments,
        data.payment_intent.as_deref(),
        &data.id,
        data.metadata_payment_id,
    )
    .await?;
    let Some(payment) = resolved else {
        return Ok(ack_payment_not_found(cx, "charge.failed"));
    };

    if evaluate_promotion(cx, &payment, PaymentStatus::Failed) != Promotion::Apply {
        return Ok(Handled::untouched());
    }

    cx.payments
        .update_status_failed_from_charge(payment.id, &data.id, &cx.stamp())
        .await?;

    tracing::info!(
        event_id = %cx.event_id,
        payment_id = %payment.id,
        charge_id = %data.id,
        "payment marked failed from charge"
    );
    Ok(Handled::payment(payment.id))
}

/// `charge.refunded`: reconcile the refund aggregate from the event's
/// authoritative `amount_refunded`, recompute the application-fee refund
/// total from the provider, and promote to `refunded` only when the charge
/// is fully refunded. A provider failure on the fee sum keeps the prior DB
/// fee aggregates instead of zeroing them.
pub async fn handle_refunded(cx: &HandlerContext<'_>, object: &Value) -> HandlerResult {
    let data = ChargeData::from_object(object)?;
    let total_refunded = data
        .amount_refunded
        .ok_or_else(|| WebhookError::InvalidPayload {
            reason: "missing_amount_refunded".to_string(),
        })?;

    let resolved = resolve_by_charge_or_fallback(
        cx.payments,
        data.payment_intent.as_deref(),
        &data.id,
        data.metadata_payment_id,
    )
    .await?;
    let Some(payment) = resolved else {
        return Ok(ack_payment_not_found(cx, "charge.refunded"));
    };

    let fee_id = data
        .application_fee
        .clone()
        .or_else(|| payment.application_fee_id.clone());
    let (fee_refunded, fee_refund_id) = match fee_id {
        Some(fee_id) => match cx.gateway.sum_application_fee_refunds(&fee_id).await {
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
        },
        None => (
            payment.application_fee_refunded_amount,
            payment.application_fee_refund_id.clone(),
        ),
    };

    let target = refund_target_status(total_refunded, payment.amount, payment.status, false);
    if payment.status.promotion(target) == Promotion::Blocked {
        tracing::info!(
            event_id = %cx.event_id,
            payment_id = %payment.id,
            "refund target would demote, acknowledging"
        );
        return Ok(Handled::untouched());
    }

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
        "refund aggregate applied"
    );

    cx.side_effects.dispatch(SideEffect::RegenerateSettlement {
        payment_id: payment.id,
        attendance_id: payment.attendance_id,
    });

    Ok(Handled::payment(payment.id))
}
