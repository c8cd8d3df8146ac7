use async_trait::async_trait;

/// Outbound seam to the broker. One call publishes one message: the type tag
/// travels as metadata, the payload as the body, and the retry count as a
/// header so a redelivered message knows how many attempts it already burned.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(
        &self,
        event_type: &str,
        payload: &[u8],
        retry_count: u32,
    ) -> anyhow::Result<()>;
}
