use {
    crate::domain::{
        error::{ErrorCategory, RepositoryError, classify_sqlstate},
        payment::{DisputeUpsert, EventStamp},
        ports::DisputeStore,
    },
    async_trait::async_trait,
    sqlx::PgPool,
};

/// Dispute records keyed by the provider's dispute id. Dispute events arrive
/// repeatedly over the dispute's life, so this is a single upsert.
pub struct PgDisputeStore {
    pool: PgPool,
}

impl PgDisputeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn repo_error(operation: &'static str, err: sqlx::Error) -> RepositoryError {
    let (code, category) = match &err {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned());
            let category = code
                .as_deref()
                .map(classify_sqlstate)
                .unwrap_or(ErrorCategory::Unknown);
            (code, category)
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => (None, ErrorCategory::Transient),
        _ => (None, ErrorCategory::Unknown),
    };
    RepositoryError {
        operation,
        code,
        category,
        message: err.to_string(),
    }
}

#[async_trait]
impl DisputeStore for PgDisputeStore {
    async fn upsert(
        &self,
        dispute: &DisputeUpsert,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO payment_disputes
                (stripe_dispute_id, payment_id, charge_id, payment_intent_id,
                 amount, currency, reason, status, evidence_due_by,
                 stripe_account_id, closed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            ON CONFLICT (stripe_dispute_id) DO UPDATE
            SET payment_id = COALESCE(EXCLUDED.payment_id, payment_disputes.payment_id),
                charge_id = COALESCE(EXCLUDED.charge_id, payment_disputes.charge_id),
                payment_intent_id =
                    COALESCE(EXCLUDED.payment_intent_id, payment_disputes.payment_intent_id),
                amount = EXCLUDED.amount,
                currency = EXCLUDED.currency,
                reason = COALESCE(EXCLUDED.reason, payment_disputes.reason),
                status = EXCLUDED.status,
                evidence_due_by =
                    COALESCE(EXCLUDED.evidence_due_by, payment_disputes.evidence_due_by),
                stripe_account_id =
                    COALESCE(EXCLUDED.stripe_account_id, payment_disputes.stripe_account_id),
                closed_at = COALESCE(EXCLUDED.closed_at, payment_disputes.closed_at),
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&dispute.stripe_dispute_id)
        .bind(dispute.payment_id)
        .bind(&dispute.charge_id)
        .bind(&dispute.payment_intent_id)
        .bind(dispute.amount)
        .bind(&dispute.currency)
        .bind(&dispute.reason)
        .bind(&dispute.status)
        .bind(dispute.evidence_due_by)
        .bind(&dispute.stripe_account_id)
        .bind(dispute.closed_at)
        .bind(stamp.processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| repo_error("dispute_upsert", e))?;
        Ok(())
    }
}
