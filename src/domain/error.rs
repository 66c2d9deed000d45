use {
    serde::Serialize,
    thiserror::Error,
    uuid::Uuid,
};

/// Stable machine-readable error codes surfaced to the transport.
pub mod codes {
    pub const INVALID_PAYLOAD: &str = "WEBHOOK_INVALID_PAYLOAD";
    pub const PAYMENT_NOT_FOUND: &str = "WEBHOOK_PAYMENT_NOT_FOUND";
    pub const UNEXPECTED: &str = "WEBHOOK_UNEXPECTED_ERROR";
    pub const EVENT_IN_PROGRESS: &str = "WEBHOOK_EVENT_IN_PROGRESS";
    pub const CHECKOUT_EXPIRED_UPDATE_FAILED: &str =
        "STRIPE_CHECKOUT_SESSION_EXPIRED_UPDATE_FAILED";
    pub const SETTLEMENT_REGENERATE_FAILED: &str = "SETTLEMENT_REGENERATE_FAILED";
    pub const GA4_TRACKING_FAILED: &str = "GA4_TRACKING_FAILED";
    pub const PAYMENT_COMPLETION_NOTIFICATION_FAILED: &str =
        "PAYMENT_COMPLETION_NOTIFICATION_FAILED";
}

// ── Database error classification ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Constraint or data violation (SQLSTATE 22xx/23xx). Retrying cannot help.
    Integrity,
    /// A single-row query matched more than one row. Data corruption signal.
    Cardinality,
    /// Connection, timeout, resource exhaustion. Worth retrying.
    Transient,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integrity => "integrity",
            Self::Cardinality => "cardinality",
            Self::Transient => "transient",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Integrity | Self::Cardinality)
    }
}

/// Classify a SQLSTATE code into a retry category.
///
/// 22xxx (data exception) and 23xxx (integrity violation) cannot succeed on
/// retry. 08xxx (connection), 53xxx (insufficient resources), 57xxx (operator
/// intervention) and 40001/40P01 (serialization/deadlock) are transient.
pub fn classify_sqlstate(code: &str) -> ErrorCategory {
    if code.starts_with("22") || code.starts_with("23") {
        ErrorCategory::Integrity
    } else if code.starts_with("08")
        || code.starts_with("53")
        || code.starts_with("57")
        || code == "40001"
        || code == "40P01"
    {
        ErrorCategory::Transient
    } else {
        ErrorCategory::Unknown
    }
}

/// A read or write against the `payments` table failed.
#[derive(Debug, Error)]
#[error("payment repository {operation} failed ({}): {message}", .category.as_str())]
pub struct RepositoryError {
    pub operation: &'static str,
    pub code: Option<String>,
    pub category: ErrorCategory,
    pub message: String,
}

impl RepositoryError {
    pub fn terminal(&self) -> bool {
        self.category.is_terminal()
    }

    /// Ledger failure code for this error, e.g.
    /// `payment_repository_find_by_charge_id_transient_failed`.
    pub fn ledger_code(&self) -> String {
        format!(
            "payment_repository_{}_{}_failed",
            self.operation,
            self.category.as_str()
        )
    }
}

/// A write against the event ledger failed. Always retryable: without a
/// ledger row we cannot prove the event was applied.
#[derive(Debug, Error)]
#[error("ledger {operation} failed: {message}")]
pub struct LedgerFailure {
    pub operation: &'static str,
    pub code: Option<String>,
    pub constraint: Option<String>,
    pub message: String,
}

// ── Handler / orchestrator error taxonomy ────────────────────────────────────

#[derive(Debug, Error)]
pub enum WebhookError {
    /// The event object is missing data the handler requires. Terminal:
    /// redelivering the same payload can never succeed.
    #[error("invalid payload: {reason}")]
    InvalidPayload { reason: String },

    /// A handler-tagged failure carrying its own surfaced code.
    #[error("{code}: {reason}")]
    Operation {
        code: &'static str,
        reason: String,
        terminal: bool,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Ledger(#[from] LedgerFailure),

    /// Stripe API failure on a path that cannot fall back. Retryable.
    #[error("provider: {0}")]
    Provider(String),

    /// The begin-processing claim loop exhausted its attempts.
    #[error("ledger contention for event {event_id}")]
    LedgerContention { event_id: String },

    /// Another worker holds a fresh `processing` claim on this event.
    #[error("event {event_id} is already being processed")]
    EventInProgress { event_id: String },

    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl WebhookError {
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::InvalidPayload { .. } => true,
            Self::Operation { terminal, .. } => *terminal,
            Self::Repository(e) => e.terminal(),
            Self::Ledger(_)
            | Self::Provider(_)
            | Self::LedgerContention { .. }
            | Self::EventInProgress { .. }
            | Self::Unexpected(_) => false,
        }
    }

    /// The machine-readable code recorded in the ledger and surfaced to the
    /// transport.
    pub fn error_code(&self) -> String {
        match self {
            Self::InvalidPayload { .. } => codes::INVALID_PAYLOAD.to_string(),
            Self::Operation { code, .. } => (*code).to_string(),
            Self::Repository(e) => e.ledger_code(),
            Self::EventInProgress { .. } => codes::EVENT_IN_PROGRESS.to_string(),
            Self::Ledger(_)
            | Self::Provider(_)
            | Self::LedgerContention { .. }
            | Self::Unexpected(_) => codes::UNEXPECTED.to_string(),
        }
    }

    /// Short reason tag recorded alongside the code.
    pub fn reason(&self) -> String {
        match self {
            Self::InvalidPayload { reason } => reason.clone(),
            Self::Operation { reason, .. } => reason.clone(),
            Self::Repository(e) => format!("{}_{}", e.operation, e.category.as_str()),
            Self::Ledger(f) => format!("ledger_{}_failed", f.operation),
            Self::Provider(_) => "stripe_api_error".to_string(),
            Self::LedgerContention { .. } => "ledger_contention".to_string(),
            Self::EventInProgress { .. } => "webhook_event_in_progress".to_string(),
            Self::Unexpected(_) => "unexpected_error".to_string(),
        }
    }

    /// Generic message safe to show to an end user.
    pub fn user_message(&self) -> &'static str {
        if self.is_terminal() {
            "The payment notification could not be processed."
        } else {
            "Payment processing is delayed. It will be retried shortly."
        }
    }
}

// ── Outbound result per event ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeMeta {
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeError {
    pub code: String,
    pub message: String,
    pub user_message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureMeta {
    pub terminal: bool,
    pub reason: String,
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// What the transport gets back for one delivered event. `terminal: true`
/// tells the caller to ACK and stop redelivering; a retryable failure asks
/// for redelivery.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProcessOutcome {
    #[serde(rename_all = "camelCase")]
    Ok { success: bool, meta: OutcomeMeta },
    #[serde(rename_all = "camelCase")]
    Err {
        success: bool,
        error: OutcomeError,
        meta: FailureMeta,
    },
}

impl ProcessOutcome {
    pub fn success(event_id: &str, payment_id: Option<Uuid>) -> Self {
        Self::Ok {
            success: true,
            meta: OutcomeMeta {
                event_id: event_id.to_string(),
                payment_id,
            },
        }
    }

    pub fn failure(event_id: &str, payment_id: Option<Uuid>, err: &WebhookError) -> Self {
        let terminal = err.is_terminal();
        let code = err.error_code();
        Self::Err {
            success: false,
            error: OutcomeError {
                code: code.clone(),
                message: err.to_string(),
                user_message: err.user_message().to_string(),
                retryable: !terminal,
            },
            meta: FailureMeta {
                terminal,
                reason: err.reason(),
                event_id: event_id.to_string(),
                payment_id,
                error_code: Some(code),
            },
        }
    }

    /// A terminal failure recorded by an earlier delivery; the transport
    /// should ACK without reprocessing.
    pub fn duplicate_terminal(event_id: &str, code: Option<String>, reason: Option<String>) -> Self {
        let code = code.unwrap_or_else(|| codes::UNEXPECTED.to_string());
        Self::Err {
            success: false,
            error: OutcomeError {
                code: code.clone(),
                message: "event previously failed terminally".to_string(),
                user_message: "The payment notification could not be processed.".to_string(),
                retryable: false,
            },
            meta: FailureMeta {
                terminal: true,
                reason: reason.unwrap_or_else(|| "duplicate_terminal_failure".to_string()),
                event_id: event_id.to_string(),
                payment_id: None,
                error_code: Some(code),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Ok { .. } => true,
            Self::Err { meta, .. } => meta.terminal,
        }
    }

    pub fn should_retry(&self) -> bool {
        !self.is_terminal()
    }
}
