use std::sync::Arc;

use async_nats::HeaderMap;
use async_trait::async_trait;
use tracing::debug;

use super::connection::ConnectionManager;
use super::{EVENT_TYPE_HEADER, RETRY_COUNT_HEADER};
use crate::application::services::event_bus::EventBus;
use crate::domain::errors::DeliveryError;

/// Publishes one JetStream message per event on `<prefix>.<event_type>`,
/// waiting for the broker's ack before reporting success. Any failure flips
/// the connection manager back to Disconnected so the next call reconnects.
pub struct JetStreamEventBus {
    manager: Arc<ConnectionManager>,
}

impl JetStreamEventBus {
    pub fn new(manager: Arc<ConnectionManager>) -> Arc<Self> {
        Arc::new(Self { manager })
    }

    fn subject_for(&self, event_type: &str) -> String {
        format!("{}.{}", self.manager.config().subject_prefix, event_type)
    }
}

#[async_trait]
impl EventBus for JetStreamEventBus {
    async fn publish(
        &self,
        event_type: &str,
        payload: &[u8],
        retry_count: u32,
    ) -> anyhow::Result<()> {
        let channel = self.manager.ensure_ready().await?;

        let mut headers = HeaderMap::new();
        headers.insert(EVENT_TYPE_HEADER, event_type);
        headers.insert(RETRY_COUNT_HEADER, retry_count.to_string().as_str());

        let publish = channel
            .context
            .publish_with_headers(
                self.subject_for(event_type),
                headers,
                payload.to_vec().into(),
            )
            .await;

        let ack = match publish {
            Ok(ack) => ack,
            Err(err) => {
                self.manager.mark_disconnected().await;
                return Err(DeliveryError::Publish {
                    event_type: event_type.to_string(),
                    reason: err.to_string(),
                }
                .into());
            }
        };

        if let Err(err) = ack.await {
            self.manager.mark_disconnected().await;
            return Err(DeliveryError::Publish {
                event_type: event_type.to_string(),
                reason: err.to_string(),
            }
            .into());
        }

        debug!(event_type, retry_count, "published event");
        Ok(())
    }
}
