use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Failures before an event reaches the processing engine: a missing or
/// invalid signature, or a body that is not a webhook event at all. Once the
/// engine runs, the outcome mapping in the webhook adapter takes over.
#[derive(Debug)]
pub enum ApiError {
    Signature(String),
    Payload(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            Self::Signature(msg) => {
                tracing::warn!(error = %msg, "webhook signature verification failed");
                (
                    StatusCode::BAD_REQUEST,
                    "webhook_signature_error",
                    "invalid webhook signature".to_string(),
                )
            }
            Self::Payload(msg) => {
                tracing::warn!(error = %msg, "webhook payload rejected");
                (StatusCode::BAD_REQUEST, "webhook_payload_error", msg)
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
