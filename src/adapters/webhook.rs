use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{error::ProcessOutcome, event::EventEnvelope},
    },
    axum::{Json, extract::State, http::HeaderMap, http::StatusCode},
};

/// `POST /webhook`: verify the Stripe signature, decode the envelope, run
/// the engine, and translate the outcome into the retry signal the provider
/// understands: 2xx stops redelivery, 4xx/5xx asks for it.
#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty)
)]
pub async fn wh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<ProcessOutcome>), ApiError> {
    let sig = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Signature("missing Stripe-Signature header".into()))?;

    // Verification only; routing and extraction work off the raw JSON so the
    // engine sees every event type the account is subscribed to.
    stripe::Webhook::construct_event(&body, sig, &state.stripe_webhook_secret)
        .map_err(|e| ApiError::Signature(e.to_string()))?;

    let raw: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| ApiError::Payload(e.to_string()))?;
    let envelope = EventEnvelope::from_json(&raw).map_err(|e| ApiError::Payload(e.to_string()))?;

    tracing::Span::current()
        .record("event_id", tracing::field::display(envelope.id.as_str()))
        .record("event_type", tracing::field::display(&envelope.event_type));

    let outcome = state.processor.process(&envelope).await;

    Ok((outcome_status(&outcome), Json(outcome)))
}

/// Terminal outcomes (success or unretryable failure) are ACKed with 200 so
/// the provider stops. A fresh in-progress claim elsewhere maps to 409 and
/// everything else retryable to 503, both of which trigger redelivery.
fn outcome_status(outcome: &ProcessOutcome) -> StatusCode {
    if outcome.is_terminal() {
        StatusCode::OK
    } else {
        match outcome {
            ProcessOutcome::Err { meta, .. } if meta.reason == "webhook_event_in_progress" => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}
