use {
    super::{
        Handled, HandlerContext, HandlerResult, ack_payment_not_found, evaluate_promotion,
    },
    crate::{
        domain::{
            error::{WebhookError, codes},
            event::CheckoutSessionData,
            payment::CheckoutSessionLink,
            ports::resolve_checkout_target,
            status::{PaymentStatus, Promotion},
        },
        services::side_effects::SideEffect,
    },
    serde_json::Value,
};

/// `checkout.session.completed`: link the session (and payment intent, when
/// present) to the payment named by `metadata.payment_id`. The payment stays
/// `pending`; money state arrives via payment-intent and charge events.
pub async fn handle_completed(cx: &HandlerContext<'_>, object: &Value) -> HandlerResult {
    let data = CheckoutSessionData::from_object(object)?;
    let payment_id = data.required_payment_id()?;

    let Some(payment) = cx.payments.find_by_id(payment_id).await? else {
        return Ok(ack_payment_not_found(cx, "checkout.session.completed"));
    };

    if payment.checkout_session_id.as_deref() == Some(data.id.as_str()) {
        tracing::info!(
            event_id = %cx.event_id,
            payment_id = %payment.id,
            checkout_session_id = %data.id,
            "checkout session already linked, acknowledging"
        );
        return Ok(Handled::payment(payment.id));
    }

    let link = CheckoutSessionLink {
        payment_id: payment.id,
        checkout_session_id: data.id.clone(),
        payment_intent_id: data.payment_intent.clone(),
    };
    cx.payments
        .save_checkout_session_link(&link, &cx.stamp())
        .await?;

    tracing::info!(
        event_id = %cx.event_id,
        payment_id = %payment.id,
        checkout_session_id = %data.id,
        "checkout session linked"
    );

    if let Some(ga_client_id) = data.ga_client_id {
        cx.side_effects.dispatch(SideEffect::TrackCheckoutAnalytics {
            payment_id: payment.id,
            ga_client_id,
        });
    }

    Ok(Handled::payment(payment.id))
}

/// `checkout.session.expired`: the buyer abandoned checkout. Promote to
/// `failed` unless the payment already moved past it.
pub async fn handle_expired(cx: &HandlerContext<'_>, object: &Value) -> HandlerResult {
    let data = CheckoutSessionData::from_object(object)?;

    let resolved =
        resolve_checkout_target(cx.payments, &data.id, data.fallback_payment_id()).await?;
    let Some(payment) = resolved else {
        return Ok(ack_payment_not_found(cx, "checkout.session.expired"));
    };

    if evaluate_promotion(cx, &payment, PaymentStatus::Failed) != Promotion::Apply {
        return Ok(Handled::untouched());
    }

    cx.payments
        .update_status_failed_from_checkout_session(payment.id, &data.id, &cx.stamp())
        .await
        .map_err(|e| WebhookError::Operation {
            code: codes::CHECKOUT_EXPIRED_UPDATE_FAILED,
            reason: e.to_string(),
            terminal: e.terminal(),
        })?;

    tracing::info!(
        event_id = %cx.event_id,
        payment_id = %payment.id,
        "payment failed on checkout session expiry"
    );
    Ok(Handled::payment(payment.id))
}

/// `checkout.session.async_payment_*` carries no state we act on; the
/// payment-intent and charge events are authoritative.
pub fn handle_async_payment(cx: &HandlerContext<'_>, event_type: &str) -> Handled {
    tracing::info!(event_id = %cx.event_id, event_type, "async payment notification, acknowledging");
    Handled::untouched()
}
