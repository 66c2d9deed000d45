use {
    super::{
        handlers::{self, HandlerContext},
        ledger::begin_processing,
        side_effects::SideEffectQueue,
    },
    crate::domain::{
        error::{ProcessOutcome, WebhookError},
        event::EventEnvelope,
        ledger::{BeginAction, FailureRecord},
        ports::{DisputeStore, LedgerStore, PaymentStore, ProviderGateway},
        router::route,
    },
    chrono::Utc,
    std::sync::Arc,
};

/// Ties one event's life together: claim the ledger row, route to the
/// handler, record the verdict. Holds every port the handlers need.
pub struct WebhookProcessor {
    pub ledger: Arc<dyn LedgerStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub disputes: Arc<dyn DisputeStore>,
    pub gateway: Arc<dyn ProviderGateway>,
    pub side_effects: SideEffectQueue,
}

impl WebhookProcessor {
    #[tracing::instrument(
        name = "process_event",
        skip_all,
        fields(event_id = %envelope.id, event_type = %envelope.event_type)
    )]
    pub async fn process(&self, envelope: &EventEnvelope) -> ProcessOutcome {
        let now = Utc::now();
        let event_id = envelope.id.as_str();

        let begin = match begin_processing(&*self.ledger, envelope, now).await {
            Ok(decision) => decision,
            Err(err) => {
                // Contention or a ledger read/write failure: nothing was
                // claimed, so there is nothing to mark. Ask for redelivery.
                tracing::warn!(error = %err, "ledger begin failed, requesting retry");
                return ProcessOutcome::failure(event_id, None, &err);
            }
        };

        match begin.action {
            BeginAction::Process => {}
            BeginAction::AckDuplicateSucceeded => {
                tracing::info!("event already applied, acknowledging duplicate");
                return ProcessOutcome::success(event_id, None);
            }
            BeginAction::AckDuplicateInProgress => {
                tracing::info!("event claimed by another worker, requesting retry");
                let err = WebhookError::EventInProgress {
                    event_id: event_id.to_string(),
                };
                return ProcessOutcome::failure(event_id, None, &err);
            }
            BeginAction::AckDuplicateFailedTerminal => {
                let (code, reason) = begin.last_error.clone().unwrap_or((None, None));
                tracing::info!(?code, "event previously failed terminally, acknowledging");
                return ProcessOutcome::duplicate_terminal(event_id, code, reason);
            }
        }

        // Observability only: the same (event_type, object_id) under a new
        // event id usually means the provider re-emitted after a config change.
        match self
            .ledger
            .find_latest_by_dedupe_key(&begin.dedupe_key, event_id)
            .await
        {
            Ok(Some(prior)) => {
                tracing::warn!(
                    dedupe_key = %begin.dedupe_key,
                    prior_event_id = %prior.stripe_event_id,
                    prior_status = prior.processing_status.as_str(),
                    "object seen before under a different event id"
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "dedupe key lookup failed, continuing");
            }
        }

        let cx = HandlerContext {
            payments: &*self.payments,
            disputes: &*self.disputes,
            gateway: &*self.gateway,
            side_effects: &self.side_effects,
            event_id: &envelope.id,
            account: envelope.account.as_deref(),
            now,
        };

        let result = handlers::dispatch(&cx, route(&envelope.event_type), envelope).await;

        match result {
            Ok(handled) => {
                if let Err(e) = self.ledger.mark_succeeded(event_id, Utc::now()).await {
                    // The effect may have been applied without a durable
                    // witness; redelivery will resolve via the handlers'
                    // idempotent paths.
                    tracing::error!(error = %e, "mark_succeeded failed after successful handling");
                    return ProcessOutcome::failure(
                        event_id,
                        handled.payment_id,
                        &WebhookError::Ledger(e),
                    );
                }
                tracing::info!(payment_id = ?handled.payment_id, "event processed");
                ProcessOutcome::success(event_id, handled.payment_id)
            }
            Err(err) => {
                let failure = FailureRecord::from(&err);
                tracing::warn!(
                    code = %failure.error_code,
                    reason = %failure.reason,
                    terminal = failure.terminal,
                    "handler failed"
                );
                if let Err(mark_err) = self
                    .ledger
                    .mark_failed(event_id, &failure, Utc::now())
                    .await
                {
                    // Log only: the primary error decides the outcome.
                    tracing::error!(error = %mark_err, "mark_failed failed, keeping primary error");
                }
                ProcessOutcome::failure(event_id, None, &err)
            }
        }
    }
}
