use {
    crate::domain::{
        error::LedgerFailure,
        ledger::{FailureRecord, LedgerEntry, NewLedgerEntry, ProcessingStatus},
        ports::{InsertOutcome, LedgerStore},
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::PgPool,
};

/// Event ledger backed by `webhook_event_ledger`. The unique event-id insert
/// and the guarded claim UPDATE together form the compare-and-swap this
/// system uses instead of row locks.
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    stripe_event_id: String,
    event_type: String,
    stripe_object_id: Option<String>,
    dedupe_key: String,
    processing_status: String,
    is_terminal_failure: bool,
    last_error_code: Option<String>,
    last_error_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl LedgerRow {
    fn into_entry(self, operation: &'static str) -> Result<LedgerEntry, LedgerFailure> {
        let processing_status = ProcessingStatus::try_from(self.processing_status.as_str())
            .map_err(|e| LedgerFailure {
                operation,
                code: None,
                constraint: None,
                message: e.to_string(),
            })?;
        Ok(LedgerEntry {
            stripe_event_id: self.stripe_event_id,
            event_type: self.event_type,
            stripe_object_id: self.stripe_object_id,
            dedupe_key: self.dedupe_key,
            processing_status,
            is_terminal_failure: self.is_terminal_failure,
            last_error_code: self.last_error_code,
            last_error_reason: self.last_error_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
            processed_at: self.processed_at,
        })
    }
}

fn ledger_failure(operation: &'static str, err: sqlx::Error) -> LedgerFailure {
    let (code, constraint) = match &err {
        sqlx::Error::Database(db) => (
            db.code().map(|c| c.into_owned()),
            db.constraint().map(str::to_string),
        ),
        _ => (None, None),
    };
    LedgerFailure {
        operation,
        code,
        constraint,
        message: err.to_string(),
    }
}

const LEDGER_COLUMNS: &str = "stripe_event_id, event_type, stripe_object_id, dedupe_key, \
     processing_status, is_terminal_failure, last_error_code, last_error_reason, \
     created_at, updated_at, processed_at";

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find(&self, event_id: &str) -> Result<Option<LedgerEntry>, LedgerFailure> {
        let row = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM webhook_event_ledger WHERE stripe_event_id = $1",
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ledger_failure("find", e))?;

        row.map(|r| r.into_entry("find")).transpose()
    }

    async fn insert_processing(
        &self,
        entry: NewLedgerEntry,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome, LedgerFailure> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_event_ledger
                (stripe_event_id, event_type, stripe_object_id, dedupe_key,
                 processing_status, is_terminal_failure, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'processing', false, $5, $5)
            ON CONFLICT (stripe_event_id) DO NOTHING
            "#,
        )
        .bind(&entry.stripe_event_id)
        .bind(&entry.event_type)
        .bind(&entry.stripe_object_id)
        .bind(&entry.dedupe_key)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| ledger_failure("insert_processing", e))?;

        if result.rows_affected() > 0 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::DuplicateEvent)
        }
    }

    async fn claim(
        &self,
        event_id: &str,
        observed: ProcessingStatus,
        stale_before: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerFailure> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_event_ledger
            SET processing_status = 'processing',
                is_terminal_failure = false,
                last_error_code = NULL,
                last_error_reason = NULL,
                updated_at = $4
            WHERE stripe_event_id = $1
              AND processing_status = $2
              AND ($3::timestamptz IS NULL OR updated_at <= $3)
            "#,
        )
        .bind(event_id)
        .bind(observed.as_str())
        .bind(stale_before)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| ledger_failure("claim", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_succeeded(
        &self,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerFailure> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_event_ledger
            SET processing_status = 'succeeded',
                is_terminal_failure = false,
                last_error_code = NULL,
                last_error_reason = NULL,
                processed_at = $2,
                updated_at = $2
            WHERE stripe_event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| ledger_failure("mark_succeeded", e))?;

        if result.rows_affected() == 0 {
            return Err(LedgerFailure {
                operation: "mark_succeeded",
                code: None,
                constraint: None,
                message: format!("no ledger row for event {event_id}"),
            });
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        event_id: &str,
        failure: &FailureRecord,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerFailure> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_event_ledger
            SET processing_status = 'failed',
                is_terminal_failure = $2,
                last_error_code = $3,
                last_error_reason = $4,
                processed_at = $5,
                updated_at = $5
            WHERE stripe_event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(failure.terminal)
        .bind(&failure.error_code)
        .bind(&failure.reason)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| ledger_failure("mark_failed", e))?;

        if result.rows_affected() == 0 {
            return Err(LedgerFailure {
                operation: "mark_failed",
                code: None,
                constraint: None,
                message: format!("no ledger row for event {event_id}"),
            });
        }
        Ok(())
    }

    async fn find_latest_by_dedupe_key(
        &self,
        dedupe_key: &str,
        excluding_event_id: &str,
    ) -> Result<Option<LedgerEntry>, LedgerFailure> {
        let row = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM webhook_event_ledger \
             WHERE dedupe_key = $1 AND stripe_event_id <> $2 \
             ORDER BY created_at DESC LIMIT 1",
        ))
        .bind(dedupe_key)
        .bind(excluding_event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ledger_failure("find_latest_by_dedupe_key", e))?;

        row.map(|r| r.into_entry("find_latest_by_dedupe_key"))
            .transpose()
    }
}
