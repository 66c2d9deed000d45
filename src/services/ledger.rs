use {
    crate::domain::{
        error::WebhookError,
        event::EventEnvelope,
        ledger::{
            BeginAction, BeginDecision, MAX_BEGIN_ATTEMPTS, NewLedgerEntry, ProcessingStatus,
            stale_timeout,
        },
        ports::{InsertOutcome, LedgerStore},
    },
    chrono::{DateTime, Utc},
};

/// Decide whether this delivery gets to process the event.
///
/// One pass: read the row; absorb duplicates (`succeeded`, fresh
/// `processing`, terminal `failed`); insert when absent; otherwise claim the
/// abandoned row with a guarded update. Insert conflicts and lost claims
/// re-enter the loop: another worker moved first and the re-read decides
/// what its move means for us. Bounded so two workers trading claims cannot
/// spin forever.
pub async fn begin_processing(
    store: &dyn LedgerStore,
    envelope: &EventEnvelope,
    now: DateTime<Utc>,
) -> Result<BeginDecision, WebhookError> {
    let event_id = envelope.id.as_str();
    let object_id = envelope.object_id().map(str::to_string);
    let dedupe_key = envelope.dedupe_key();

    let decision = |action: BeginAction, last_error| BeginDecision {
        action,
        dedupe_key: dedupe_key.clone(),
        object_id: object_id.clone(),
        last_error,
    };

    for attempt in 0..MAX_BEGIN_ATTEMPTS {
        if attempt > 0 {
            tracing::debug!(event_id, attempt, "retrying ledger claim");
        }

        let existing = store.find(event_id).await?;

        let Some(row) = existing else {
            let entry = NewLedgerEntry {
                stripe_event_id: event_id.to_string(),
                event_type: envelope.event_type.clone(),
                stripe_object_id: object_id.clone(),
                dedupe_key: dedupe_key.clone(),
            };
            match store.insert_processing(entry, now).await? {
                InsertOutcome::Inserted => {
                    return Ok(decision(BeginAction::Process, None));
                }
                // Lost the insert race; re-read to see what won.
                InsertOutcome::DuplicateEvent => continue,
            }
        };

        match row.processing_status {
            ProcessingStatus::Succeeded => {
                return Ok(decision(BeginAction::AckDuplicateSucceeded, None));
            }
            ProcessingStatus::Processing if !row.is_stale(now) => {
                return Ok(decision(BeginAction::AckDuplicateInProgress, None));
            }
            ProcessingStatus::Failed if row.is_terminal() => {
                return Ok(decision(
                    BeginAction::AckDuplicateFailedTerminal,
                    Some((row.last_error_code.clone(), row.last_error_reason.clone())),
                ));
            }
            observed @ (ProcessingStatus::Processing | ProcessingStatus::Failed) => {
                let stale_before = (observed == ProcessingStatus::Processing)
                    .then(|| now - stale_timeout());
                if store.claim(event_id, observed, stale_before, now).await? {
                    return Ok(decision(BeginAction::Process, None));
                }
                // Another worker re-claimed between our read and update.
            }
        }
    }

    Err(WebhookError::LedgerContention {
        event_id: event_id.to_string(),
    })
}
