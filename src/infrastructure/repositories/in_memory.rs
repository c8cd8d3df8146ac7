use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    events::IntegrationEvent,
    models::{OutboxRecord, OutboxStats},
    repositories::OutboxRepository,
};

/// Map-backed outbox for tests and embedded use. The map has no useful
/// iteration order, so fetching sorts in application code instead of relying
/// on the store.
#[derive(Default)]
pub struct InMemoryOutboxRepository {
    records: Arc<RwLock<HashMap<Uuid, OutboxRecord>>>,
}

impl InMemoryOutboxRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// No transaction to join here: the record is visible as soon as the
    /// write lock drops.
    pub async fn enqueue(&self, event: &IntegrationEvent) -> anyhow::Result<Uuid> {
        let record = OutboxRecord::from_event(event);
        let id = record.id;
        self.records.write().await.insert(id, record);
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Option<OutboxRecord> {
        self.records.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl OutboxRepository for InMemoryOutboxRepository {
    async fn fetch_unprocessed(&self, max_count: u32) -> anyhow::Result<Vec<OutboxRecord>> {
        let records = self.records.read().await;
        let mut pending: Vec<OutboxRecord> = records
            .values()
            .filter(|record| record.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|record| record.occurred_at);
        pending.truncate(max_count as usize);
        Ok(pending)
    }

    async fn mark_processed(&self, id: Uuid) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&id) {
            if record.processed_at.is_none() {
                record.processed_at = Some(Utc::now());
                record.last_error = None;
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str, retry_count: u32) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&id) {
            if record.processed_at.is_none() {
                record.last_error = Some(error.to_string());
                record.retry_count = retry_count;
            }
        }
        Ok(())
    }

    async fn pending_stats(&self) -> anyhow::Result<OutboxStats> {
        let records = self.records.read().await;
        let mut pending_count = 0i64;
        let mut oldest: Option<DateTime<Utc>> = None;
        for record in records.values().filter(|record| record.is_pending()) {
            pending_count += 1;
            oldest = Some(match oldest {
                Some(current) => current.min(record.occurred_at),
                None => record.occurred_at,
            });
        }
        Ok(OutboxStats {
            pending_count,
            oldest_occurred_at: oldest,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    use super::*;

    fn event_at(event_type: &str, occurred_at: DateTime<Utc>) -> IntegrationEvent {
        IntegrationEvent::new(event_type, json!({ "k": event_type }))
            .with_occurred_at(occurred_at)
    }

    #[tokio::test]
    async fn fetch_orders_by_occurred_at_regardless_of_insertion_order() {
        let repo = InMemoryOutboxRepository::new();
        let base = Utc::now();

        // inserted newest first on purpose
        let id_c = repo
            .enqueue(&event_at("C", base + ChronoDuration::seconds(2)))
            .await
            .unwrap();
        let id_a = repo.enqueue(&event_at("A", base)).await.unwrap();
        let id_b = repo
            .enqueue(&event_at("B", base + ChronoDuration::seconds(1)))
            .await
            .unwrap();

        let batch = repo.fetch_unprocessed(10).await.unwrap();
        let ids: Vec<Uuid> = batch.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![id_a, id_b, id_c]);
    }

    #[tokio::test]
    async fn fetch_respects_max_count_and_keeps_oldest() {
        let repo = InMemoryOutboxRepository::new();
        let base = Utc::now();
        let id_a = repo.enqueue(&event_at("A", base)).await.unwrap();
        repo.enqueue(&event_at("B", base + ChronoDuration::seconds(1)))
            .await
            .unwrap();

        let batch = repo.fetch_unprocessed(1).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, id_a);
    }

    #[tokio::test]
    async fn processed_records_are_never_fetched() {
        let repo = InMemoryOutboxRepository::new();
        let id_a = repo.enqueue(&event_at("A", Utc::now())).await.unwrap();
        let id_b = repo
            .enqueue(&event_at("B", Utc::now() + ChronoDuration::seconds(1)))
            .await
            .unwrap();

        repo.mark_processed(id_a).await.unwrap();

        let batch = repo.fetch_unprocessed(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, id_b);
    }

    #[tokio::test]
    async fn mark_processed_is_idempotent() {
        let repo = InMemoryOutboxRepository::new();
        let id = repo.enqueue(&event_at("A", Utc::now())).await.unwrap();

        repo.mark_processed(id).await.unwrap();
        let first = repo.get(id).await.unwrap().processed_at;
        assert!(first.is_some());

        repo.mark_processed(id).await.unwrap();
        let second = repo.get(id).await.unwrap().processed_at;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn mark_failed_keeps_record_pending() {
        let repo = InMemoryOutboxRepository::new();
        let id = repo.enqueue(&event_at("A", Utc::now())).await.unwrap();

        repo.mark_failed(id, "broker said no", 1).await.unwrap();

        let record = repo.get(id).await.unwrap();
        assert!(record.is_pending());
        assert_eq!(record.last_error.as_deref(), Some("broker said no"));
        assert_eq!(record.retry_count, 1);

        let batch = repo.fetch_unprocessed(10).await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn mark_processed_clears_last_error() {
        let repo = InMemoryOutboxRepository::new();
        let id = repo.enqueue(&event_at("A", Utc::now())).await.unwrap();

        repo.mark_failed(id, "transient", 2).await.unwrap();
        repo.mark_processed(id).await.unwrap();

        let record = repo.get(id).await.unwrap();
        assert!(record.last_error.is_none());
        assert!(!record.is_pending());
    }

    #[tokio::test]
    async fn pending_stats_count_and_oldest() {
        let repo = InMemoryOutboxRepository::new();
        let base = Utc::now();
        let id_a = repo.enqueue(&event_at("A", base)).await.unwrap();
        repo.enqueue(&event_at("B", base + ChronoDuration::seconds(5)))
            .await
            .unwrap();

        let stats = repo.pending_stats().await.unwrap();
        assert_eq!(stats.pending_count, 2);
        assert_eq!(stats.oldest_occurred_at, Some(base));

        repo.mark_processed(id_a).await.unwrap();
        let stats = repo.pending_stats().await.unwrap();
        assert_eq!(stats.pending_count, 1);
        assert_eq!(
            stats.oldest_occurred_at,
            Some(base + ChronoDuration::seconds(5))
        );
    }
}
