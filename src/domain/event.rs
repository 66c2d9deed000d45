use {
    super::{error::WebhookError, id::EventId, ledger},
    serde_json::Value,
    uuid::Uuid,
};

/// A verified provider event, decoded from the raw webhook body. Signature
/// verification happens in the transport adapter; everything past that point
/// works off this envelope.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub id: EventId,
    pub event_type: String,
    pub account: Option<String>,
    pub request_id: Option<String>,
    /// The raw `data.object`; handlers extract their typed view from it.
    pub object: Value,
}

impl EventEnvelope {
    pub fn from_json(raw: &Value) -> Result<Self, WebhookError> {
        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| WebhookError::InvalidPayload {
                reason: "missing_event_id".to_string(),
            })?;
        let event_type = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| WebhookError::InvalidPayload {
                reason: "missing_event_type".to_string(),
            })?;
        let object = raw
            .pointer("/data/object")
            .cloned()
            .unwrap_or(Value::Null);

        Ok(Self {
            id: EventId::new(id)?,
            event_type: event_type.to_string(),
            account: non_empty_str(raw, "account"),
            request_id: raw
                .pointer("/request/id")
                .and_then(Value::as_str)
                .map(str::to_string),
            object,
        })
    }

    pub fn object_id(&self) -> Option<&str> {
        self.object.get("id").and_then(Value::as_str)
    }

    pub fn dedupe_key(&self) -> String {
        ledger::dedupe_key(&self.event_type, self.object_id())
    }
}

// ── Extraction helpers ───────────────────────────────────────────────────────

/// Expandable references arrive either as a bare id string or as the full
/// object; either way only the id matters here.
fn expandable_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(_) => v
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn expandable_field(object: &Value, key: &str) -> Option<String> {
    object.get(key).and_then(expandable_id)
}

fn non_empty_str(object: &Value, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn metadata_str(object: &Value, key: &str) -> Option<String> {
    object
        .pointer(&format!("/metadata/{key}"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_id(object: &Value, missing: &str) -> Result<String, WebhookError> {
    non_empty_str(object, "id").ok_or_else(|| WebhookError::InvalidPayload {
        reason: missing.to_string(),
    })
}

/// `metadata.payment_id` parsed leniently: a malformed value is treated as
/// absent so the caller can fall through to the next resolution key.
fn metadata_payment_uuid(object: &Value) -> Option<Uuid> {
    metadata_str(object, "payment_id").and_then(|s| Uuid::parse_str(&s).ok())
}

// ── Per-family typed payloads ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CheckoutSessionData {
    pub id: String,
    pub payment_intent: Option<String>,
    pub metadata_payment_id: Option<String>,
    pub ga_client_id: Option<String>,
}

impl CheckoutSessionData {
    pub fn from_object(object: &Value) -> Result<Self, WebhookError> {
        Ok(Self {
            id: required_id(object, "missing_checkout_session_id")?,
            payment_intent: expandable_field(object, "payment_intent"),
            metadata_payment_id: metadata_str(object, "payment_id"),
            ga_client_id: metadata_str(object, "ga_client_id"),
        })
    }

    /// `metadata.payment_id` as required by `checkout.session.completed`.
    pub fn required_payment_id(&self) -> Result<Uuid, WebhookError> {
        self.metadata_payment_id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| WebhookError::InvalidPayload {
                reason: "missing_payment_id".to_string(),
            })
    }

    pub fn fallback_payment_id(&self) -> Option<Uuid> {
        self.metadata_payment_id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

#[derive(Debug, Clone)]
pub struct PaymentIntentData {
    pub id: String,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub metadata_payment_id: Option<Uuid>,
}

impl PaymentIntentData {
    pub fn from_object(object: &Value) -> Result<Self, WebhookError> {
        Ok(Self {
            id: required_id(object, "missing_payment_intent_id")?,
            amount: object.get("amount").and_then(Value::as_i64),
            currency: non_empty_str(object, "currency"),
            metadata_payment_id: metadata_payment_uuid(object),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChargeData {
    pub id: String,
    pub payment_intent: Option<String>,
    pub amount: Option<i64>,
    pub amount_refunded: Option<i64>,
    pub application_fee: Option<String>,
    pub balance_transaction: Option<String>,
    pub transfer: Option<String>,
    pub metadata_payment_id: Option<Uuid>,
}

impl ChargeData {
    pub fn from_object(object: &Value) -> Result<Self, WebhookError> {
        Ok(Self {
            id: required_id(object, "missing_charge_id")?,
            payment_intent: expandable_field(object, "payment_intent"),
            amount: object.get("amount").and_then(Value::as_i64),
            amount_refunded: object.get("amount_refunded").and_then(Value::as_i64),
            application_fee: expandable_field(object, "application_fee"),
            balance_transaction: expandable_field(object, "balance_transaction"),
            transfer: expandable_field(object, "transfer"),
            metadata_payment_id: metadata_payment_uuid(object),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RefundData {
    pub id: String,
    pub status: Option<String>,
    pub charge: Option<String>,
}

impl RefundData {
    pub fn from_object(object: &Value) -> Result<Self, WebhookError> {
        Ok(Self {
            id: required_id(object, "missing_refund_id")?,
            status: non_empty_str(object, "status"),
            charge: expandable_field(object, "charge"),
        })
    }
}

/// Application-fee events carry either an `ApplicationFee` object or a
/// `FeeRefund` whose `fee` field references one.
pub fn extract_application_fee_id(object: &Value) -> Option<String> {
    match object.get("object").and_then(Value::as_str) {
        Some("application_fee") => non_empty_str(object, "id"),
        Some("fee_refund") => expandable_field(object, "fee"),
        _ => {
            // Object tag missing: accept an af_-prefixed id or a fee reference.
            if let Some(id) = non_empty_str(object, "id")
                && id.starts_with("af_")
            {
                return Some(id);
            }
            expandable_field(object, "fee")
        }
    }
}

#[derive(Debug, Clone)]
pub struct DisputeData {
    pub id: String,
    pub charge: Option<String>,
    pub payment_intent: Option<String>,
    pub amount: i64,
    pub currency: Option<String>,
    pub reason: Option<String>,
    pub status: Option<String>,
    pub evidence_due_by: Option<i64>,
}

impl DisputeData {
    pub fn from_object(object: &Value) -> Result<Self, WebhookError> {
        Ok(Self {
            id: required_id(object, "missing_dispute_id")?,
            charge: expandable_field(object, "charge"),
            payment_intent: expandable_field(object, "payment_intent"),
            amount: object.get("amount").and_then(Value::as_i64).unwrap_or(0),
            currency: non_empty_str(object, "currency"),
            reason: non_empty_str(object, "reason"),
            status: non_empty_str(object, "status"),
            evidence_due_by: object
                .pointer("/evidence_details/due_by")
                .and_then(Value::as_i64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_from_json() {
        let raw = json!({
            "id": "evt_1",
            "type": "charge.succeeded",
            "account": "acct_9",
            "request": {"id": "req_1"},
            "data": {"object": {"id": "ch_1"}}
        });
        let env = EventEnvelope::from_json(&raw).unwrap();
        assert_eq!(env.id.as_str(), "evt_1");
        assert_eq!(env.event_type, "charge.succeeded");
        assert_eq!(env.account.as_deref(), Some("acct_9"));
        assert_eq!(env.request_id.as_deref(), Some("req_1"));
        assert_eq!(env.object_id(), Some("ch_1"));
        assert_eq!(env.dedupe_key(), "charge.succeeded:ch_1");
    }

    #[test]
    fn envelope_missing_object_id_uses_unknown() {
        let raw = json!({"id": "evt_2", "type": "transfer.created", "data": {"object": {}}});
        let env = EventEnvelope::from_json(&raw).unwrap();
        assert_eq!(env.dedupe_key(), "transfer.created:unknown");
    }

    #[test]
    fn envelope_rejects_missing_type() {
        let raw = json!({"id": "evt_3", "data": {"object": {}}});
        assert!(EventEnvelope::from_json(&raw).is_err());
    }

    #[test]
    fn expandable_accepts_id_or_object() {
        let obj = json!({
            "id": "ch_1",
            "payment_intent": "pi_1",
            "balance_transaction": {"id": "txn_1", "fee": 36}
        });
        let data = ChargeData::from_object(&obj).unwrap();
        assert_eq!(data.payment_intent.as_deref(), Some("pi_1"));
        assert_eq!(data.balance_transaction.as_deref(), Some("txn_1"));
    }

    #[test]
    fn checkout_metadata_payment_id_required() {
        let obj = json!({"id": "cs_1", "metadata": {}});
        let data = CheckoutSessionData::from_object(&obj).unwrap();
        assert!(data.required_payment_id().is_err());

        let id = Uuid::new_v4();
        let obj = json!({"id": "cs_1", "metadata": {"payment_id": id.to_string()}});
        let data = CheckoutSessionData::from_object(&obj).unwrap();
        assert_eq!(data.required_payment_id().unwrap(), id);
    }

    #[test]
    fn malformed_metadata_payment_id_is_treated_as_absent() {
        let obj = json!({"id": "pi_1", "metadata": {"payment_id": "not-a-uuid"}});
        let data = PaymentIntentData::from_object(&obj).unwrap();
        assert!(data.metadata_payment_id.is_none());
    }

    #[test]
    fn empty_metadata_strings_are_absent() {
        let obj = json!({"id": "cs_1", "metadata": {"payment_id": "", "ga_client_id": ""}});
        let data = CheckoutSessionData::from_object(&obj).unwrap();
        assert!(data.metadata_payment_id.is_none());
        assert!(data.ga_client_id.is_none());
    }

    #[test]
    fn application_fee_id_from_fee_object() {
        let obj = json!({"object": "application_fee", "id": "af_1"});
        assert_eq!(extract_application_fee_id(&obj).as_deref(), Some("af_1"));
    }

    #[test]
    fn application_fee_id_from_fee_refund() {
        let obj = json!({"object": "fee_refund", "id": "fr_1", "fee": "af_2"});
        assert_eq!(extract_application_fee_id(&obj).as_deref(), Some("af_2"));

        let obj = json!({"object": "fee_refund", "id": "fr_1", "fee": {"id": "af_3"}});
        assert_eq!(extract_application_fee_id(&obj).as_deref(), Some("af_3"));
    }

    #[test]
    fn application_fee_id_absent() {
        let obj = json!({"object": "fee_refund", "id": "fr_1"});
        assert_eq!(extract_application_fee_id(&obj), None);
    }

    #[test]
    fn dispute_evidence_due_by() {
        let obj = json!({
            "id": "dp_1",
            "charge": "ch_1",
            "amount": 3000,
            "currency": "JPY",
            "status": "needs_response",
            "evidence_details": {"due_by": 1735689600}
        });
        let data = DisputeData::from_object(&obj).unwrap();
        assert_eq!(data.evidence_due_by, Some(1735689600));
        assert_eq!(data.currency.as_deref(), Some("JPY"));
    }
}
