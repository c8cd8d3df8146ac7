use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What producers hand to the outbox: a wire type tag plus an already
/// serialized payload, stamped with the moment the change happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl IntegrationEvent {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

/// One received broker delivery, decoded as far as the transport headers go.
/// The retry count comes from the `X-Retry-Count` header and defaults to 0
/// for messages that never went through a requeue.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub event_type: String,
    pub payload: Vec<u8>,
    pub retry_count: u32,
}
