/// Where an event type is dispatched. Stripe emits several spellings for the
/// same logical family (`refund.created` vs `charge.refund.created`); the
/// router collapses those onto one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRoute {
    CheckoutCompleted,
    CheckoutExpired,
    /// `checkout.session.async_payment_*`: log only, the terminal signal
    /// arrives as a payment-intent or charge event.
    CheckoutAsyncPayment,
    PaymentIntentSucceeded,
    PaymentIntentFailed,
    PaymentIntentCanceled,
    ChargeSucceeded,
    ChargeFailed,
    ChargeRefunded,
    RefundCreated,
    RefundUpdated,
    RefundFailed,
    ApplicationFeeRefund,
    Dispute(DisputeKind),
    /// ACK without processing. `recognized` distinguishes types we ignore on
    /// purpose (transfers) from types we have never seen.
    Ignored { recognized: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeKind {
    Created,
    Closed,
    Updated,
    FundsReinstated,
}

pub fn route(event_type: &str) -> EventRoute {
    match event_type {
        "checkout.session.completed" => EventRoute::CheckoutCompleted,
        "checkout.session.expired" => EventRoute::CheckoutExpired,
        "checkout.session.async_payment_succeeded"
        | "checkout.session.async_payment_failed" => EventRoute::CheckoutAsyncPayment,

        "payment_intent.succeeded" => EventRoute::PaymentIntentSucceeded,
        "payment_intent.payment_failed" => EventRoute::PaymentIntentFailed,
        "payment_intent.canceled" => EventRoute::PaymentIntentCanceled,

        "charge.succeeded" => EventRoute::ChargeSucceeded,
        "charge.failed" => EventRoute::ChargeFailed,
        "charge.refunded" => EventRoute::ChargeRefunded,

        "refund.created" | "charge.refund.created" => EventRoute::RefundCreated,
        "refund.updated" | "charge.refund.updated" => EventRoute::RefundUpdated,
        "refund.failed" => EventRoute::RefundFailed,

        "application_fee.refunded" | "application_fee.refund.updated" => {
            EventRoute::ApplicationFeeRefund
        }

        "charge.dispute.created" => EventRoute::Dispute(DisputeKind::Created),
        "charge.dispute.closed" => EventRoute::Dispute(DisputeKind::Closed),
        "charge.dispute.updated" => EventRoute::Dispute(DisputeKind::Updated),
        "charge.dispute.funds_reinstated" => EventRoute::Dispute(DisputeKind::FundsReinstated),

        "transfer.created" | "transfer.updated" | "transfer.reversed" => {
            EventRoute::Ignored { recognized: true }
        }

        _ => EventRoute::Ignored { recognized: false },
    }
}
