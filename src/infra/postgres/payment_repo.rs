use {
    crate::domain::{
        error::{ErrorCategory, RepositoryError, classify_sqlstate},
        payment::{
            AppFeeRefundAggregateUpdate, ChargeSnapshot, CheckoutSessionLink, EventStamp,
            PaymentRecord, RefundAggregateUpdate,
        },
        ports::PaymentStore,
        status::PaymentStatus,
    },
    async_trait::async_trait,
    sqlx::PgPool,
    uuid::Uuid,
};

/// Typed access to the `payments` row. Updaters are unconditional SQL
/// (monotonicity is the handlers' responsibility) and every write stamps the
/// applying event id and processing time.
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_text_key(
        &self,
        operation: &'static str,
        sql: &str,
        key: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, PaymentRow>(sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| repo_error(operation, e))?;
        single(rows, operation)
    }
}

/// The fixed projection backing every finder.
const PROJECTION: &str = "SELECT id, status, amount, attendance_id, \
     stripe_payment_intent_id AS payment_intent_id, \
     stripe_charge_id AS charge_id, \
     stripe_checkout_session_id AS checkout_session_id, \
     stripe_application_fee_id AS application_fee_id, \
     stripe_application_fee_refund_id AS application_fee_refund_id, \
     application_fee_refunded_amount \
     FROM payments";

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    status: String,
    amount: i64,
    attendance_id: Option<Uuid>,
    payment_intent_id: Option<String>,
    charge_id: Option<String>,
    checkout_session_id: Option<String>,
    application_fee_id: Option<String>,
    application_fee_refund_id: Option<String>,
    application_fee_refunded_amount: i64,
}

impl PaymentRow {
    fn into_record(self, operation: &'static str) -> Result<PaymentRecord, RepositoryError> {
        let status =
            PaymentStatus::try_from(self.status.as_str()).map_err(|e| RepositoryError {
                operation,
                code: None,
                // An unparseable status is corrupt data; retrying won't fix it.
                category: ErrorCategory::Integrity,
                message: e.to_string(),
            })?;
        Ok(PaymentRecord {
            id: self.id,
            status,
            amount: self.amount,
            attendance_id: self.attendance_id,
            payment_intent_id: self.payment_intent_id,
            charge_id: self.charge_id,
            checkout_session_id: self.checkout_session_id,
            application_fee_id: self.application_fee_id,
            application_fee_refund_id: self.application_fee_refund_id,
            application_fee_refunded_amount: self.application_fee_refunded_amount,
        })
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

fn single(
    rows: Vec<PaymentRow>,
    operation: &'static str,
) -> Result<Option<PaymentRecord>, RepositoryError> {
    match rows.len() {
        0 => Ok(None),
        1 => rows
            .into_iter()
            .next()
            .map(|r| r.into_record(operation))
            .transpose(),
        n => Err(RepositoryError {
            operation,
            code: None,
            category: ErrorCategory::Cardinality,
            message: format!("expected at most one payment row, found {n}"),
        }),
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!("{PROJECTION} WHERE id = $1"))
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| repo_error("find_by_id", e))?;
        single(rows, "find_by_id")
    }

    async fn find_by_payment_intent_id(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        self.find_by_text_key(
            "find_by_payment_intent_id",
            &format!("{PROJECTION} WHERE stripe_payment_intent_id = $1"),
            payment_intent_id,
        )
        .await
    }

    async fn find_by_charge_id(
        &self,
        charge_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        self.find_by_text_key(
            "find_by_charge_id",
            &format!("{PROJECTION} WHERE stripe_charge_id = $1"),
            charge_id,
        )
        .await
    }

    async fn find_by_checkout_session_id(
        &self,
        checkout_session_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        self.find_by_text_key(
            "find_by_checkout_session_id",
            &format!("{PROJECTION} WHERE stripe_checkout_session_id = $1"),
            checkout_session_id,
        )
        .await
    }

    async fn find_by_application_fee_id(
        &self,
        application_fee_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        self.find_by_text_key(
            "find_by_application_fee_id",
            &format!("{PROJECTION} WHERE stripe_application_fee_id = $1"),
            application_fee_id,
        )
        .await
    }

    async fn save_checkout_session_link(
        &self,
        link: &CheckoutSessionLink,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE payments
            SET stripe_checkout_session_id = $2,
                stripe_payment_intent_id = COALESCE($3, stripe_payment_intent_id),
                webhook_event_id = $4,
                webhook_processed_at = $5,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(link.payment_id)
        .bind(&link.checkout_session_id)
        .bind(&link.payment_intent_id)
        .bind(&stamp.webhook_event_id)
        .bind(stamp.processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| repo_error("save_checkout_session_link", e))?;
        Ok(())
    }

    async fn update_status_paid_from_payment_intent(
        &self,
        payment_id: Uuid,
        payment_intent_id: &str,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'paid',
                stripe_payment_intent_id = $2,
                paid_at = $4,
                webhook_event_id = $3,
                webhook_processed_at = $4,
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(payment_id)
        .bind(payment_intent_id)
        .bind(&stamp.webhook_event_id)
        .bind(stamp.processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| repo_error("update_status_paid_from_payment_intent", e))?;
        Ok(())
    }

    async fn update_status_failed_from_payment_intent(
        &self,
        payment_id: Uuid,
        payment_intent_id: &str,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'failed',
                stripe_payment_intent_id = $2,
                webhook_event_id = $3,
                webhook_processed_at = $4,
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(payment_id)
        .bind(payment_intent_id)
        .bind(&stamp.webhook_event_id)
        .bind(stamp.processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| repo_error("update_status_failed_from_payment_intent", e))?;
        Ok(())
    }

    async fn update_status_failed_from_checkout_session(
        &self,
        payment_id: Uuid,
        checkout_session_id: &str,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'failed',
                stripe_checkout_session_id = $2,
                webhook_event_id = $3,
                webhook_processed_at = $4,
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(payment_id)
        .bind(checkout_session_id)
        .bind(&stamp.webhook_event_id)
        .bind(stamp.processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| repo_error("update_status_failed_from_checkout_session", e))?;
        Ok(())
    }

    async fn update_status_paid_from_charge_snapshot(
        &self,
        payment_id: Uuid,
        snapshot: &ChargeSnapshot,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'paid',
                stripe_charge_id = $2,
                stripe_payment_intent_id = COALESCE($3, stripe_payment_intent_id),
                stripe_balance_transaction_id = $4,
                fee_details = $5,
                stripe_transfer_id = $6,
                stripe_application_fee_id = $7,
                paid_at = $9,
                webhook_event_id = $8,
                webhook_processed_at = $9,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(payment_id)
        .bind(&snapshot.charge_id)
        .bind(&snapshot.payment_intent_id)
        .bind(&snapshot.balance_transaction_id)
        .bind(&snapshot.fee_details)
        .bind(&snapshot.transfer_id)
        .bind(&snapshot.application_fee_id)
        .bind(&stamp.webhook_event_id)
        .bind(stamp.processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| repo_error("update_status_paid_from_charge_snapshot", e))?;
        Ok(())
    }

    async fn update_status_failed_from_charge(
        &self,
        payment_id: Uuid,
        charge_id: &str,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'failed',
                stripe_charge_id = $2,
                webhook_event_id = $3,
                webhook_processed_at = $4,
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(payment_id)
        .bind(charge_id)
        .bind(&stamp.webhook_event_id)
        .bind(stamp.processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| repo_error("update_status_failed_from_charge", e))?;
        Ok(())
    }

    async fn update_refund_aggregate(
        &self,
        update: &RefundAggregateUpdate,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = $2,
                refunded_amount = $3,
                application_fee_refunded_amount = $4,
                stripe_application_fee_refund_id = $5,
                webhook_event_id = $6,
                webhook_processed_at = $7,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(update.payment_id)
        .bind(update.status.as_str())
        .bind(update.refunded_amount)
        .bind(update.application_fee_refunded_amount)
        .bind(&update.application_fee_refund_id)
        .bind(&stamp.webhook_event_id)
        .bind(stamp.processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| repo_error("update_refund_aggregate", e))?;
        Ok(())
    }

    async fn update_application_fee_refund_aggregate(
        &self,
        update: &AppFeeRefundAggregateUpdate,
        stamp: &EventStamp,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE payments
            SET application_fee_refunded_amount = $2,
                stripe_application_fee_refund_id = $3,
                webhook_event_id = $4,
                webhook_processed_at = $5,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(update.payment_id)
        .bind(update.application_fee_refunded_amount)
        .bind(&update.application_fee_refund_id)
        .bind(&stamp.webhook_event_id)
        .bind(stamp.processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| repo_error("update_application_fee_refund_aggregate", e))?;
        Ok(())
    }
}
