use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::{OutboxRecord, OutboxStats};

/// The relay's view of the outbox. Enqueue is not part of this trait: it has
/// to run on the caller's own database transaction, so each store exposes it
/// with the transaction type it actually supports.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Up to `max_count` pending records, oldest `occurred_at` first.
    async fn fetch_unprocessed(&self, max_count: u32) -> anyhow::Result<Vec<OutboxRecord>>;

    /// Stamps `processed_at` and clears `last_error`. Idempotent: a second
    /// call leaves the timestamp of the first in place.
    async fn mark_processed(&self, id: Uuid) -> anyhow::Result<()>;

    /// Records the publish failure; the record stays pending.
    async fn mark_failed(&self, id: Uuid, error: &str, retry_count: u32) -> anyhow::Result<()>;

    async fn pending_stats(&self) -> anyhow::Result<OutboxStats>;
}
