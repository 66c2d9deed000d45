use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::WebhookError;

/// Stripe event identifier (`evt_xxx`). The ledger is keyed by this value,
/// so an empty id is rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Result<Self, WebhookError> {
        let id = id.into();
        if id.is_empty() {
            return Err(WebhookError::InvalidPayload {
                reason: "empty_event_id".to_string(),
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_accepts_nonempty() {
        let id = EventId::new("evt_123").unwrap();
        assert_eq!(id.as_str(), "evt_123");
        assert_eq!(id.to_string(), "evt_123");
    }

    #[test]
    fn event_id_rejects_empty() {
        assert!(EventId::new("").is_err());
    }
}
