use {
    super::error::{WebhookError, codes},
    chrono::{DateTime, Duration, Utc},
};

/// A `processing` claim older than this is considered abandoned and may be
/// reclaimed by the next delivery. Request timeouts must stay well under it.
pub const STALE_TIMEOUT_SECS: i64 = 5 * 60;

pub fn stale_timeout() -> Duration {
    Duration::seconds(STALE_TIMEOUT_SECS)
}

/// Upper bound on begin-processing claim iterations before giving up with a
/// retryable `ledger_contention` failure.
pub const MAX_BEGIN_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Processing,
    Succeeded,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for ProcessingStatus {
    type Error = WebhookError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "processing" => Ok(Self::Processing),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(WebhookError::Unexpected(format!(
                "unknown ledger processing status: {other}"
            ))),
        }
    }
}

/// One row of the event ledger: the durable record of what happened to a
/// provider event id.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub stripe_event_id: String,
    pub event_type: String,
    pub stripe_object_id: Option<String>,
    pub dedupe_key: String,
    pub processing_status: ProcessingStatus,
    pub is_terminal_failure: bool,
    pub last_error_code: Option<String>,
    pub last_error_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// Whether a `failed` row is absorbing for its event id. The explicit
    /// flag wins; invalid-payload and SQLSTATE 22/23 codes are terminal even
    /// if the flag was not set when the failure was recorded.
    pub fn is_terminal(&self) -> bool {
        if self.is_terminal_failure {
            return true;
        }
        match self.last_error_code.as_deref() {
            Some(code) => {
                code == codes::INVALID_PAYLOAD || code.starts_with("22") || code.starts_with("23")
            }
            None => false,
        }
    }

    /// Whether a `processing` claim has outlived its freshness window.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.updated_at >= stale_timeout()
    }
}

/// Insert payload for a first processing attempt.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub stripe_event_id: String,
    pub event_type: String,
    pub stripe_object_id: Option<String>,
    pub dedupe_key: String,
}

/// Failure details recorded by `mark_failed`.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub error_code: String,
    pub reason: String,
    pub terminal: bool,
}

impl From<&WebhookError> for FailureRecord {
    fn from(err: &WebhookError) -> Self {
        Self {
            error_code: err.error_code(),
            reason: err.reason(),
            terminal: err.is_terminal(),
        }
    }
}

/// What begin-processing decided for this delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginAction {
    /// This worker holds the claim; run the handler.
    Process,
    AckDuplicateSucceeded,
    AckDuplicateInProgress,
    AckDuplicateFailedTerminal,
}

#[derive(Debug, Clone)]
pub struct BeginDecision {
    pub action: BeginAction,
    pub dedupe_key: String,
    pub object_id: Option<String>,
    /// Last recorded failure, present for `AckDuplicateFailedTerminal`.
    pub last_error: Option<(Option<String>, Option<String>)>,
}

/// Secondary observability key; recurrence of the same key under a new event
/// id is logged, never enforced.
pub fn dedupe_key(event_type: &str, object_id: Option<&str>) -> String {
    format!("{}:{}", event_type, object_id.unwrap_or("unknown"))
}
