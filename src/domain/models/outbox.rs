use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::events::IntegrationEvent;

/// Durable copy of an integration event, written in the same transaction as
/// the business change that raised it. A record with `processed_at == None`
/// is pending and will be picked up by the relay; the relay is the only
/// writer of `processed_at`, `last_error` and `retry_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub retry_count: u32,
}

impl OutboxRecord {
    pub fn from_event(event: &IntegrationEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
            occurred_at: event.occurred_at,
            processed_at: None,
            last_error: None,
            retry_count: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.processed_at.is_none()
    }
}

/// Snapshot of the backlog, for operators watching for stuck records.
#[derive(Debug, Clone, Serialize)]
pub struct OutboxStats {
    pub pending_count: i64,
    pub oldest_occurred_at: Option<DateTime<Utc>>,
}
