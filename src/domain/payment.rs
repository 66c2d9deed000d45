use {
    super::status::PaymentStatus,
    chrono::{DateTime, Utc},
    serde_json::Value,
    uuid::Uuid,
};

/// Read model of a `payments` row, the fixed projection every finder
/// returns. Enough to decide promotions and refund aggregates; updaters
/// carry the rest.
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub amount: i64,
    pub attendance_id: Option<Uuid>,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub application_fee_id: Option<String>,
    pub application_fee_refund_id: Option<String>,
    pub application_fee_refunded_amount: i64,
}

/// Observability stamp written with every payment mutation: which event
/// applied it and when.
#[derive(Debug, Clone)]
pub struct EventStamp {
    pub webhook_event_id: String,
    pub processed_at: DateTime<Utc>,
}

// ── Updater payloads ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CheckoutSessionLink {
    pub payment_id: Uuid,
    pub checkout_session_id: String,
    pub payment_intent_id: Option<String>,
}

/// Everything `charge.succeeded` knows about the money movement. Populated
/// from the event object, then overwritten field-by-field when the provider
/// fetch returns the expanded latest charge.
#[derive(Debug, Clone, Default)]
pub struct ChargeSnapshot {
    pub charge_id: String,
    pub payment_intent_id: Option<String>,
    pub balance_transaction_id: Option<String>,
    pub fee_details: Option<Value>,
    pub transfer_id: Option<String>,
    pub application_fee_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefundAggregateUpdate {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub refunded_amount: i64,
    pub application_fee_refunded_amount: i64,
    pub application_fee_refund_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppFeeRefundAggregateUpdate {
    pub payment_id: Uuid,
    pub application_fee_refunded_amount: i64,
    pub application_fee_refund_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DisputeUpsert {
    pub stripe_dispute_id: String,
    pub payment_id: Option<Uuid>,
    pub charge_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub reason: Option<String>,
    pub status: String,
    pub evidence_due_by: Option<DateTime<Utc>>,
    pub stripe_account_id: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
}

// ── Refund decisions ─────────────────────────────────────────────────────────

/// Target status after reconciling a refund total against the payment.
///
/// A full refund promotes to `refunded`. A partial (or vanished) refund keeps
/// the current status, unless the caller allows demotion and the payment sits
/// at `refunded`, in which case the reversal drops it back to `paid`. This is
/// the only demoting write in the system and every call site passes the flag
/// explicitly.
pub fn refund_target_status(
    total_refunded: i64,
    payment_amount: i64,
    current: PaymentStatus,
    allow_demotion: bool,
) -> PaymentStatus {
    if total_refunded >= payment_amount {
        PaymentStatus::Refunded
    } else if allow_demotion && current == PaymentStatus::Refunded {
        PaymentStatus::Paid
    } else {
        current
    }
}
