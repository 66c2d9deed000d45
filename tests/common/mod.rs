#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_pay::domain::{
    error::{ErrorCategory, LedgerFailure, RepositoryError, WebhookError},
    event::EventEnvelope,
    ledger::{FailureRecord, LedgerEntry, NewLedgerEntry, ProcessingStatus},
    payment::{
        AppFeeRefundAggregateUpdate, ChargeSnapshot, CheckoutSessionLink, DisputeUpsert,
        EventStamp, PaymentRecord, RefundAggregateUpdate,
    },
    ports::{
        DisputeStore, FeeRefundTotal, InsertOutcome, LedgerStore, PaymentStore, ProviderCharge,
        ProviderGateway, ProviderPaymentIntent,
    },
    status::PaymentStatus,
};
use event_pay::services::{
    orchestrator::WebhookProcessor,
    side_effects::{SideEffect, SideEffectQueue},
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

// ── In-memory ledger ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemLedger {
    rows: Mutex<HashMap<String, LedgerEntry>>,
    /// When set, every claim attempt loses, simulating a rival worker that
    /// always re-claims between our read and update.
    pub force_claim_conflict: AtomicBool,
    pub fail_reads: AtomicBool,
}

impl MemLedger {
    pub fn seed(&self, entry: LedgerEntry) {
        self.rows
            .lock()
            .unwrap()
            .insert(entry.stripe_event_id.clone(), entry);
    }

    pub fn get(&self, event_id: &str) -> Option<LedgerEntry> {
        self.rows.lock().unwrap().get(event_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

fn read_failure(operation: &'static str) -> LedgerFailure {
    LedgerFailure {
        operation,
        code: None,
        constraint: None,
        message: "simulated ledger failure".to_string(),
    }
}

#[async_trait]
impl LedgerStore for MemLedger {
    async fn find(&self, event_id: &str) -> Result<Option<LedgerEntry>, LedgerFailure> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(read_failure("find"));
        }
        Ok(self.rows.lock().unwrap().get(event_id).cloned())
    }

    async fn insert_processing(
        &self,
        entry: NewLedgerEntry,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome, LedgerFailure> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&entry.stripe_event_id) {
            return Ok(InsertOutcome::DuplicateEvent);
        }
        rows.insert(
            entry.stripe_event_id.clone(),
            LedgerEntry {
                stripe_event_id: entry.stripe_event_id,
                event_type: entry.event_type,
                stripe_object_id: entry.stripe_object_id,
                dedupe_key: entry.dedupe_key,
                processing_status: ProcessingStatus::Processing,
                is_terminal_failure: false,
                last_error_code: None,
                last_error_reason: None,
                created_at: now,
                updated_at: now,
                processed_at: None,
            },
        );
        Ok(InsertOutcome::Inserted)
    }

    async fn claim(
        &self,
        event_id: &str,
        observed: ProcessingStatus,
        stale_before: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerFailure> {
        if self.force_claim_conflict.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.get_mut(event_id) else {
            return Ok(false);
        };
        if row.processing_status != observed {
            return Ok(false);
        }
        if let Some(bound) = stale_before
            && row.updated_at > bound
        {
            return Ok(false);
        }
        row.processing_status = ProcessingStatus::Processing;
        row.is_terminal_failure = false;
        row.last_error_code = None;
        row.last_error_reason = None;
        row.updated_at = now;
        Ok(true)
    }

    async fn mark_succeeded(
        &self,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerFailure> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(event_id)
            .ok_or_else(|| read_failure("mark_succeeded"))?;
        row.processing_status = ProcessingStatus::Succeeded;
        row.is_terminal_failure = false;
        row.last_error_code = None;
        row.last_error_reason = None;
        row.processed_at = Some(now);
        row.updated_at = now;
        Ok(())
    }

    async fn mark_failed(
        &self,
        event_id: &str,
        failure: &FailureRecord,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerFailure> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(event_id)
            .ok_or_else(|| read_failure("mark_failed"))?;
        row.processing_status = ProcessingStatus::Failed;
        row.is_terminal_failure = failure.terminal;
        row.last_error_code = Some(failure.error_code.clone());
        row.last_error_reason = Some(failure.reason.clone());
        row.processed_at = Some(now);
        row.updated_at = now;
        Ok(())
    }

    async fn find_latest_by_dedupe_key(
        &self,
        dedupe_key: &str,
        excluding_event_id: &str,
    ) -> Result<Option<LedgerEntry>, LedgerFailure> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|r| r.dedupe_key == dedupe_key && r.stripe_event_id != excluding_event_id)
            .max_by_key(|r| r.created_at)
            .cloned())
    }
}

// ── In-memory payments ─────────────────────────────────────────────────────

/// Full mutable payment row mirroring what the SQL updaters touch.
#[derive(Debug, Clone)]
pub struct TestPayment {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub amount: i64,
    pub attendance_id: Option<Uuid>,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub balance_transaction_id: Option<String>,
    pub fee_details: Option<serde_json::Value>,
    pub transfer_id: Option<String>,
    pub application_fee_id: Option<String>,
    pub application_fee_refund_id: Option<String>,
    pub refunded_amount: i64,
    pub application_fee_refunded_amount: i64,
    pub webhook_event_id: Option<String>,
    pub webhook_processed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl TestPayment {
    pub fn pending(amount: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: PaymentStatus::Pending,
            amount,
            attendance_id: Some(Uuid::new_v4()),
            payment_intent_id: None,
            charge_id: None,
            checkout_session_id: None,
            balance_transaction_id: None,
            fee_details: None,
            transfer_id: None,
            application_fee_id: None,
            application_fee_refund_id: None,
            refunded_amount: 0,
            application_fee_refunded_amount: 0,
            webhook_event_id: None,
            webhook_processed_at: None,
            paid_at: None,
        }
    }

    pub fn paid(amount: i64) -> Self {
        let mut p = Self::pending(amount);
        p.status = PaymentStatus::Paid;
        p.paid_at = Some(Utc::now());
        p
    }

    pub fn with_payment_intent(mut self, pi: &str) -> Self {
        self.payment_intent_id = Some(pi.to_string());
        self
    }

    pub fn with_charge(mut self, charge: &str) -> Self {
        self.charge_id = Some(charge.to_string());
        self
    }

    pub fn with_checkout_session(mut self, session: &str) -> Self {
        self.checkout_session_id = Some(session.to_string());
        self
    }

    pub fn with_application_fee(mut self, fee: &str) -> Self {
        self.application_fee_id = Some(fee.to_string());
        self
    }

    pub fn with_status(mut self, status: PaymentStatus) -> Self {
        self.status = status;
        self
    }

    fn record(&self) -> PaymentRecord {
        PaymentRecord {
            id: self.id,
            status: self.status,
            amount: self.amount,
            attendance_id: self.attendance_id,
            payment_intent_id: self.payment_intent_id.clone(),
            charge_id: self.charge_id.clone(),
            checkout_session_id: self.checkout_session_id.clone(),
            application_fee_id: self.application_fee_id.clone(),
            application_fee_refund_id: self.application_fee_refund_id.clone(),
            application_fee_refunded_amount: self.application_fee_refunded_amount,
        }
    }
}

#[derive(Default)]
pub struct MemPayments {
    rows: Mutex<HashMap<Uuid, TestPayment>>,
    pub update_calls: AtomicUsize,
    pub fail_reads_as: Mutex<Option<ErrorCategory>>,
    pub fail_updates_as: Mutex<Option<ErrorCategory>>,
}

impl MemPayments {
    pub fn insert(&self, payment: TestPayment) -> Uuid {
        let id = payment.id;
        self.rows.lock().unwrap().insert(id, payment);
        id
    }

    pub fn get(&self, id: Uuid) -> TestPayment {
        self.rows.lock().unwrap().get(&id).cloned().expect("payment")
    }

    pub fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn read_guard(&self, operation: &'static str) -> Result<(), RepositoryError> {
        if let Some(category) = *self.fail_reads_as.lock().unwrap() {
            return Err(RepositoryError {
                operation,
                code: None,
                category,
                message: "simulated repository failure".to_string(),
            });
        }
        Ok(())
    }

    fn find_where<F>(
        &self,
        operation: &'static str,
        pred: F,
    ) -> Result<Option<PaymentRecord>, RepositoryError>
    where
        F: Fn(&TestPayment) -> bool,
    {
        self.read_guard(operation)?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|p| pred(p))
            .map(TestPayment::record))
    }

    fn mutate<F>(&self, id: Uuid, stamp: &EventStamp, f: F) -> Result<(), RepositoryError>
    where
        F: FnOnce(&mut TestPayment),
    {
        if let Some(category) = *self.fail_updates_as.lock().unwrap() {
            return Err(RepositoryError {
                operation: "update",
                code: None,
                category,
                message: "simulated update failure".to_string(),
            });
        }
        let mut rows = self.rows.lock().unwrap();
        if let Some(p) = rows.get_mut(&id) {
            f(p);
            p.webhook_event_id = Some(stamp.webhook_event_id.clone());
            p.webhook_processed_at = Some(stamp.processed_at);
        }
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for MemPayments {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentRecord>, RepositoryError> {
        self.find_where("find_by_id", |p| p.id == id)
    }

    async fn find_by_payment_intent_id(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        self.find_where("find_by_payment_intent_id", |p| {
            p.payment_intent_id.as_deref() == Some(payment_intent_id)
        })
    }

    async fn find_by_charge_id(
        &self,
        charge_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        self.find_where("find_by_charge_id", |p| {
            p.charge_id.as_deref() == Some(charge_id)
        })
    }

    async fn find_by_checkout_session_id(
        &self,
        checkout_session_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        self.find_where("find_by_checkout_session_id", |p| {
            p.checkout_session_id.as_deref() == Some(checkout_session_id)
        })
    }

    async fn find_by_application_fee_id(
        &self,
        application_fee_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        self.find_where("find_by_application_fee_id", |p| {
            p.application_fee_id.as_deref() == Some(application_fee_id)
        })
    }

    async fn save_checkout_session_link(
        &self,
        link: &CheckoutSessionLink,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        self.mutate(link.payment_id, stamp, |p| {
            p.checkout_session_id = Some(link.checkout_session_id.clone());
            if link.payment_intent_id.is_some() {
                p.payment_intent_id = link.payment_intent_id.clone();
            }
        })
    }

    async fn update_status_paid_from_payment_intent(
        &self,
        payment_id: Uuid,
        payment_intent_id: &str,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        let pi = payment_intent_id.to_string();
        self.mutate(payment_id, stamp, |p| {
            p.status = PaymentStatus::Paid;
            p.payment_intent_id = Some(pi);
            p.paid_at = Some(stamp.processed_at);
        })
    }

    async fn update_status_failed_from_payment_intent(
        &self,
        payment_id: Uuid,
        payment_intent_id: &str,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        let pi = payment_intent_id.to_string();
        self.mutate(payment_id, stamp, |p| {
            p.status = PaymentStatus::Failed;
            p.payment_intent_id = Some(pi);
        })
    }

    async fn update_status_failed_from_checkout_session(
        &self,
        payment_id: Uuid,
        checkout_session_id: &str,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        let session = checkout_session_id.to_string();
        self.mutate(payment_id, stamp, |p| {
            p.status = PaymentStatus::Failed;
            p.checkout_session_id = Some(session);
        })
    }

    async fn update_status_paid_from_charge_snapshot(
        &self,
        payment_id: Uuid,
        snapshot: &ChargeSnapshot,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        let snapshot = snapshot.clone();
        self.mutate(payment_id, stamp, |p| {
            p.status = PaymentStatus::Paid;
            p.charge_id = Some(snapshot.charge_id);
            if snapshot.payment_intent_id.is_some() {
                p.payment_intent_id = snapshot.payment_intent_id;
            }
            p.balance_transaction_id = snapshot.balance_transaction_id;
            p.fee_details = snapshot.fee_details;
            p.transfer_id = snapshot.transfer_id;
            p.application_fee_id = snapshot.application_fee_id;
            p.paid_at = Some(stamp.processed_at);
        })
    }

    async fn update_status_failed_from_charge(
        &self,
        payment_id: Uuid,
        charge_id: &str,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        let charge = charge_id.to_string();
        self.mutate(payment_id, stamp, |p| {
            p.status = PaymentStatus::Failed;
            p.charge_id = Some(charge);
        })
    }

    async fn update_refund_aggregate(
        &self,
        update: &RefundAggregateUpdate,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        let update = update.clone();
        self.mutate(update.payment_id, stamp, |p| {
            p.status = update.status;
            p.refunded_amount = update.refunded_amount;
            p.application_fee_refunded_amount = update.application_fee_refunded_amount;
            p.application_fee_refund_id = update.application_fee_refund_id;
        })
    }

    async fn update_application_fee_refund_aggregate(
        &self,
        update: &AppFeeRefundAggregateUpdate,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        let update = update.clone();
        self.mutate(update.payment_id, stamp, |p| {
            p.application_fee_refunded_amount = update.application_fee_refunded_amount;
            p.application_fee_refund_id = update.application_fee_refund_id;
        })
    }
}

// ── In-memory disputes ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemDisputes {
    rows: Mutex<HashMap<String, DisputeUpsert>>,
}

impl MemDisputes {
    pub fn get(&self, dispute_id: &str) -> Option<DisputeUpsert> {
        self.rows.lock().unwrap().get(dispute_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl DisputeStore for MemDisputes {
    async fn upsert(
        &self,
        dispute: &DisputeUpsert,
        _stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        self.rows
            .lock()
            .unwrap()
            .insert(dispute.stripe_dispute_id.clone(), dispute.clone());
        Ok(())
    }
}

// ── Scripted provider gateway ──────────────────────────────────────────────

#[derive(Default)]
pub struct FakeGateway {
    charges: Mutex<HashMap<String, ProviderCharge>>,
    payment_intents: Mutex<HashMap<String, ProviderPaymentIntent>>,
    fee_totals: Mutex<HashMap<String, FeeRefundTotal>>,
    pub fail_charge_retrieve: AtomicBool,
    pub fail_fee_sum: AtomicBool,
}

impl FakeGateway {
    pub fn put_charge(&self, charge: ProviderCharge) {
        self.charges.lock().unwrap().insert(charge.id.clone(), charge);
    }

    pub fn put_payment_intent(&self, pi: ProviderPaymentIntent) {
        self.payment_intents.lock().unwrap().insert(pi.id.clone(), pi);
    }

    pub fn put_fee_total(&self, fee_id: &str, amount: i64, latest_refund_id: Option<&str>) {
        self.fee_totals.lock().unwrap().insert(
            fee_id.to_string(),
            FeeRefundTotal {
                amount,
                latest_refund_id: latest_refund_id.map(str::to_string),
            },
        );
    }
}

#[async_trait]
impl ProviderGateway for FakeGateway {
    async fn retrieve_charge(&self, charge_id: &str) -> Result<ProviderCharge, WebhookError> {
        if self.fail_charge_retrieve.load(Ordering::SeqCst) {
            return Err(WebhookError::Provider("simulated charge fetch failure".into()));
        }
        self.charges
            .lock()
            .unwrap()
            .get(charge_id)
            .cloned()
            .ok_or_else(|| WebhookError::Provider(format!("unknown charge {charge_id}")))
    }

    async fn retrieve_payment_intent_with_latest_charge(
        &self,
        payment_intent_id: &str,
    ) -> Option<ProviderPaymentIntent> {
        self.payment_intents
            .lock()
            .unwrap()
            .get(payment_intent_id)
            .cloned()
    }

    async fn sum_application_fee_refunds(
        &self,
        application_fee_id: &str,
    ) -> Result<FeeRefundTotal, WebhookError> {
        if self.fail_fee_sum.load(Ordering::SeqCst) {
            return Err(WebhookError::Provider("simulated fee sum failure".into()));
        }
        Ok(self
            .fee_totals
            .lock()
            .unwrap()
            .get(application_fee_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ── Harness ────────────────────────────────────────────────────────────────

pub struct Harness {
    pub processor: Arc<WebhookProcessor>,
    pub ledger: Arc<MemLedger>,
    pub payments: Arc<MemPayments>,
    pub disputes: Arc<MemDisputes>,
    pub gateway: Arc<FakeGateway>,
    pub effects: mpsc::Receiver<SideEffect>,
}

impl Harness {
    pub fn new() -> Self {
        let ledger = Arc::new(MemLedger::default());
        let payments = Arc::new(MemPayments::default());
        let disputes = Arc::new(MemDisputes::default());
        let gateway = Arc::new(FakeGateway::default());
        let (side_effects, effects) = SideEffectQueue::new(16);

        let processor = Arc::new(WebhookProcessor {
            ledger: ledger.clone(),
            payments: payments.clone(),
            disputes: disputes.clone(),
            gateway: gateway.clone(),
            side_effects,
        });

        Self {
            processor,
            ledger,
            payments,
            disputes,
            gateway,
            effects,
        }
    }

    pub fn drain_effects(&mut self) -> Vec<SideEffect> {
        let mut out = Vec::new();
        while let Ok(effect) = self.effects.try_recv() {
            out.push(effect);
        }
        out
    }
}

// ── Event fixtures ─────────────────────────────────────────────────────────

pub fn envelope(event_type: &str, event_id: &str, object: serde_json::Value) -> EventEnvelope {
    EventEnvelope::from_json(&json!({
        "id": event_id,
        "type": event_type,
        "data": { "object": object }
    }))
    .expect("valid envelope")
}

pub fn checkout_completed(
    event_id: &str,
    session_id: &str,
    payment_intent: &str,
    payment_id: Uuid,
) -> EventEnvelope {
    envelope(
        "checkout.session.completed",
        event_id,
        json!({
            "id": session_id,
            "object": "checkout.session",
            "payment_intent": payment_intent,
            "metadata": { "payment_id": payment_id.to_string() }
        }),
    )
}

pub fn pi_succeeded(event_id: &str, pi: &str, amount: i64, currency: &str) -> EventEnvelope {
    envelope(
        "payment_intent.succeeded",
        event_id,
        json!({
            "id": pi,
            "object": "payment_intent",
            "amount": amount,
            "currency": currency,
            "metadata": {}
        }),
    )
}

pub fn charge_succeeded(event_id: &str, charge_id: &str, pi: &str) -> EventEnvelope {
    envelope(
        "charge.succeeded",
        event_id,
        json!({
            "id": charge_id,
            "object": "charge",
            "payment_intent": pi,
            "amount": 3000,
            "metadata": {}
        }),
    )
}

pub fn charge_refunded(
    event_id: &str,
    charge_id: &str,
    pi: &str,
    amount_refunded: i64,
    application_fee: Option<&str>,
) -> EventEnvelope {
    let mut object = json!({
        "id": charge_id,
        "object": "charge",
        "payment_intent": pi,
        "amount": 3000,
        "amount_refunded": amount_refunded,
        "metadata": {}
    });
    if let Some(fee) = application_fee {
        object["application_fee"] = json!(fee);
    }
    envelope("charge.refunded", event_id, object)
}

pub fn refund_updated(event_id: &str, refund_id: &str, status: &str, charge: &str) -> EventEnvelope {
    envelope(
        "refund.updated",
        event_id,
        json!({
            "id": refund_id,
            "object": "refund",
            "status": status,
            "charge": charge
        }),
    )
}

// ── Outcome helpers ────────────────────────────────────────────────────────

use event_pay::domain::error::{FailureMeta, OutcomeError, ProcessOutcome};

pub fn expect_ok(outcome: &ProcessOutcome) {
    assert!(outcome.is_success(), "expected success, got {outcome:?}");
}

pub fn expect_err(outcome: &ProcessOutcome) -> (&OutcomeError, &FailureMeta) {
    match outcome {
        ProcessOutcome::Err { error, meta, .. } => (error, meta),
        other => panic!("expected failure, got {other:?}"),
    }
}

// ── Ledger fixtures ────────────────────────────────────────────────────────

pub fn ledger_row(
    event_id: &str,
    event_type: &str,
    status: ProcessingStatus,
    updated_at: DateTime<Utc>,
) -> LedgerEntry {
    LedgerEntry {
        stripe_event_id: event_id.to_string(),
        event_type: event_type.to_string(),
        stripe_object_id: None,
        dedupe_key: format!("{event_type}:unknown"),
        processing_status: status,
        is_terminal_failure: false,
        last_error_code: None,
        last_error_reason: None,
        created_at: updated_at,
        updated_at,
        processed_at: None,
    }
}
