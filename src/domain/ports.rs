use {
    super::{
        error::{LedgerFailure, RepositoryError, WebhookError},
        ledger::{FailureRecord, LedgerEntry, NewLedgerEntry, ProcessingStatus},
        payment::{
            AppFeeRefundAggregateUpdate, CheckoutSessionLink, ChargeSnapshot, DisputeUpsert,
            EventStamp, PaymentRecord, RefundAggregateUpdate,
        },
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    serde_json::Value,
    uuid::Uuid,
};

// ── Event ledger ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another worker inserted the same event id first.
    DuplicateEvent,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find(&self, event_id: &str) -> Result<Option<LedgerEntry>, LedgerFailure>;

    /// Insert a fresh `processing` row. A unique violation on the event id is
    /// reported as `DuplicateEvent`, not an error.
    async fn insert_processing(
        &self,
        entry: NewLedgerEntry,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome, LedgerFailure>;

    /// Compare-and-swap claim of an abandoned or retryable row: set
    /// `processing` and clear error fields, guarded by the observed status
    /// (and, for `processing`, a staleness bound on `updated_at`). Returns
    /// whether this worker won the claim.
    async fn claim(
        &self,
        event_id: &str,
        observed: ProcessingStatus,
        stale_before: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerFailure>;

    /// Missing row is a hard failure: it means the claim this worker holds
    /// has no durable witness.
    async fn mark_succeeded(&self, event_id: &str, now: DateTime<Utc>)
    -> Result<(), LedgerFailure>;

    async fn mark_failed(
        &self,
        event_id: &str,
        failure: &FailureRecord,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerFailure>;

    /// Latest prior row sharing a dedupe key, for the recurrence warning.
    async fn find_latest_by_dedupe_key(
        &self,
        dedupe_key: &str,
        excluding_event_id: &str,
    ) -> Result<Option<LedgerEntry>, LedgerFailure>;
}

// ── Payments ─────────────────────────────────────────────────────────────────

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentRecord>, RepositoryError>;
    async fn find_by_payment_intent_id(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError>;
    async fn find_by_charge_id(
        &self,
        charge_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError>;
    async fn find_by_checkout_session_id(
        &self,
        checkout_session_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError>;
    async fn find_by_application_fee_id(
        &self,
        application_fee_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError>;

    async fn save_checkout_session_link(
        &self,
        link: &CheckoutSessionLink,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError>;
    async fn update_status_paid_from_payment_intent(
        &self,
        payment_id: Uuid,
        payment_intent_id: &str,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError>;
    async fn update_status_failed_from_payment_intent(
        &self,
        payment_id: Uuid,
        payment_intent_id: &str,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError>;
    async fn update_status_failed_from_checkout_session(
        &self,
        payment_id: Uuid,
        checkout_session_id: &str,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError>;
    async fn update_status_paid_from_charge_snapshot(
        &self,
        payment_id: Uuid,
        snapshot: &ChargeSnapshot,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError>;
    async fn update_status_failed_from_charge(
        &self,
        payment_id: Uuid,
        charge_id: &str,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError>;
    async fn update_refund_aggregate(
        &self,
        update: &RefundAggregateUpdate,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError>;
    async fn update_application_fee_refund_aggregate(
        &self,
        update: &AppFeeRefundAggregateUpdate,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DisputeStore: Send + Sync {
    async fn upsert(
        &self,
        dispute: &DisputeUpsert,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError>;
}

// ── Composite resolvers ──────────────────────────────────────────────────────
//
// Provider identifiers arrive in a different order per event family; these
// fix the lookup order so handlers stay uniform. All inputs are explicit
// nullables.

pub async fn resolve_by_payment_intent_or_metadata(
    store: &dyn PaymentStore,
    payment_intent_id: Option<&str>,
    metadata_payment_id: Option<Uuid>,
) -> Result<Option<PaymentRecord>, RepositoryError> {
    if let Some(pi) = payment_intent_id
        && let Some(found) = store.find_by_payment_intent_id(pi).await?
    {
        return Ok(Some(found));
    }
    if let Some(id) = metadata_payment_id {
        return store.find_by_id(id).await;
    }
    Ok(None)
}

pub async fn resolve_by_charge_or_fallback(
    store: &dyn PaymentStore,
    payment_intent_id: Option<&str>,
    charge_id: &str,
    metadata_payment_id: Option<Uuid>,
) -> Result<Option<PaymentRecord>, RepositoryError> {
    if let Some(pi) = payment_intent_id
        && let Some(found) = store.find_by_payment_intent_id(pi).await?
    {
        return Ok(Some(found));
    }
    if let Some(found) = store.find_by_charge_id(charge_id).await? {
        return Ok(Some(found));
    }
    if let Some(id) = metadata_payment_id {
        return store.find_by_id(id).await;
    }
    Ok(None)
}

pub async fn resolve_checkout_target(
    store: &dyn PaymentStore,
    checkout_session_id: &str,
    metadata_payment_id: Option<Uuid>,
) -> Result<Option<PaymentRecord>, RepositoryError> {
    if let Some(found) = store.find_by_checkout_session_id(checkout_session_id).await? {
        return Ok(Some(found));
    }
    if let Some(id) = metadata_payment_id {
        return store.find_by_id(id).await;
    }
    Ok(None)
}

pub async fn resolve_for_dispute(
    store: &dyn PaymentStore,
    payment_intent_id: Option<&str>,
    charge_id: Option<&str>,
) -> Result<Option<PaymentRecord>, RepositoryError> {
    if let Some(pi) = payment_intent_id
        && let Some(found) = store.find_by_payment_intent_id(pi).await?
    {
        return Ok(Some(found));
    }
    if let Some(ch) = charge_id {
        return store.find_by_charge_id(ch).await;
    }
    Ok(None)
}

// ── Provider gateway ─────────────────────────────────────────────────────────

/// Charge state as the provider reports it, already converted to domain
/// shape by the adapter.
#[derive(Debug, Clone, Default)]
pub struct ProviderCharge {
    pub id: String,
    pub payment_intent_id: Option<String>,
    pub amount: i64,
    pub amount_refunded: i64,
    pub application_fee_id: Option<String>,
    pub balance_transaction_id: Option<String>,
    pub fee_details: Option<Value>,
    pub transfer_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProviderPaymentIntent {
    pub id: String,
    pub latest_charge: Option<ProviderCharge>,
}

#[derive(Debug, Clone, Default)]
pub struct FeeRefundTotal {
    pub amount: i64,
    pub latest_refund_id: Option<String>,
}

#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn retrieve_charge(&self, charge_id: &str) -> Result<ProviderCharge, WebhookError>;

    /// Fetch a payment intent with its latest charge expanded. Any failure
    /// returns `None`: callers fall back to the charge carried in the event.
    async fn retrieve_payment_intent_with_latest_charge(
        &self,
        payment_intent_id: &str,
    ) -> Option<ProviderPaymentIntent>;

    /// Total refunded against an application fee, and the id of the latest
    /// refund. Errors propagate; callers decide whether to preserve prior
    /// aggregates or fail the event.
    async fn sum_application_fee_refunds(
        &self,
        application_fee_id: &str,
    ) -> Result<FeeRefundTotal, WebhookError>;
}
