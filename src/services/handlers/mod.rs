pub mod app_fee;
pub mod charge;
pub mod checkout;
pub mod dispute;
pub mod payment_intent;
pub mod refund;

use {
    super::side_effects::SideEffectQueue,
    crate::domain::{
        error::{WebhookError, codes},
        event::EventEnvelope,
        id::EventId,
        payment::{EventStamp, PaymentRecord},
        ports::{DisputeStore, PaymentStore, ProviderGateway},
        router::EventRoute,
        status::{PaymentStatus, Promotion},
    },
    chrono::{DateTime, Utc},
    uuid::Uuid,
};

/// Everything a handler may touch. Stores and gateway come in as ports so
/// the same handlers run against Postgres in production and fakes in tests.
pub struct HandlerContext<'a> {
    pub payments: &'a dyn PaymentStore,
    pub disputes: &'a dyn DisputeStore,
    pub gateway: &'a dyn ProviderGateway,
    pub side_effects: &'a SideEffectQueue,
    pub event_id: &'a EventId,
    pub account: Option<&'a str>,
    pub now: DateTime<Utc>,
}

impl HandlerContext<'_> {
    pub fn stamp(&self) -> EventStamp {
        EventStamp {
            webhook_event_id: self.event_id.as_str().to_string(),
            processed_at: self.now,
        }
    }
}

/// Successful handler outcome. `payment_id` is absent on the tolerated
/// no-op paths (not found, idempotent, promotion-blocked without a target).
#[derive(Debug, Clone, Copy)]
pub struct Handled {
    pub payment_id: Option<Uuid>,
}

impl Handled {
    pub fn untouched() -> Self {
        Self { payment_id: None }
    }

    pub fn payment(id: Uuid) -> Self {
        Self {
            payment_id: Some(id),
        }
    }
}

pub type HandlerResult = Result<Handled, WebhookError>;

/// Out-of-order delivery before session creation is normal; log and ACK.
pub(crate) fn ack_payment_not_found(cx: &HandlerContext<'_>, event_type: &str) -> Handled {
    tracing::warn!(
        code = codes::PAYMENT_NOT_FOUND,
        event_id = %cx.event_id,
        event_type,
        "no payment resolved, acknowledging without change"
    );
    Handled::untouched()
}

/// Evaluate a status promotion and log the no-op paths.
pub(crate) fn evaluate_promotion(
    cx: &HandlerContext<'_>,
    payment: &PaymentRecord,
    target: PaymentStatus,
) -> Promotion {
    let decision = payment.status.promotion(target);
    match decision {
        Promotion::Apply => {}
        Promotion::AlreadyApplied => {
            tracing::info!(
                event_id = %cx.event_id,
                payment_id = %payment.id,
                status = %payment.status,
                "status already at target rank, acknowledging"
            );
        }
        Promotion::Blocked => {
            tracing::info!(
                event_id = %cx.event_id,
                payment_id = %payment.id,
                current = %payment.status,
                target = %target,
                "demotion blocked, acknowledging"
            );
        }
    }
    decision
}

/// Route one verified event to its handler.
pub async fn dispatch(
    cx: &HandlerContext<'_>,
    route: EventRoute,
    envelope: &EventEnvelope,
) -> HandlerResult {
    match route {
        EventRoute::CheckoutCompleted => checkout::handle_completed(cx, &envelope.object).await,
        EventRoute::CheckoutExpired => checkout::handle_expired(cx, &envelope.object).await,
        EventRoute::CheckoutAsyncPayment => {
            Ok(checkout::handle_async_payment(cx, &envelope.event_type))
        }
        EventRoute::PaymentIntentSucceeded => {
            payment_intent::handle_succeeded(cx, &envelope.object).await
        }
        EventRoute::PaymentIntentFailed | EventRoute::PaymentIntentCanceled => {
            payment_intent::handle_failed(cx, &envelope.object, &envelope.event_type).await
        }
        EventRoute::ChargeSucceeded => charge::handle_succeeded(cx, &envelope.object).await,
        EventRoute::ChargeFailed => charge::handle_failed(cx, &envelope.object).await,
        EventRoute::ChargeRefunded => charge::handle_refunded(cx, &envelope.object).await,
        EventRoute::RefundCreated => Ok(refund::handle_created(cx, &envelope.object)),
        EventRoute::RefundUpdated => refund::handle_updated(cx, &envelope.object).await,
        EventRoute::RefundFailed => refund::handle_failed(cx, &envelope.object).await,
        EventRoute::ApplicationFeeRefund => app_fee::handle_refund(cx, &envelope.object).await,
        EventRoute::Dispute(kind) => dispute::handle(cx, kind, &envelope.object).await,
        EventRoute::Ignored { recognized } => {
            if recognized {
                tracing::info!(
                    event_id = %cx.event_id,
                    event_type = %envelope.event_type,
                    "event type acknowledged without processing"
                );
            } else {
                tracing::warn!(
                    event_id = %cx.event_id,
                    event_type = %envelope.event_type,
                    "unrecognized event type, acknowledging"
                );
            }
            Ok(Handled::untouched())
        }
    }
}
