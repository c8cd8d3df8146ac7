use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::IntegrationEventHandler;
use crate::domain::errors::DeliveryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// No route for the type tag. The event is discarded, not retried; a
    /// stricter deployment would hook its requeue decision here.
    Unhandled,
}

#[async_trait]
trait EventRoute: Send + Sync {
    async fn dispatch(&self, event_type: &str, payload: &[u8]) -> anyhow::Result<()>;
}

struct TypedRoute<E, H> {
    handler: Arc<H>,
    _event: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, H> EventRoute for TypedRoute<E, H>
where
    E: DeserializeOwned + Send + 'static,
    H: IntegrationEventHandler<E> + 'static,
{
    async fn dispatch(&self, event_type: &str, payload: &[u8]) -> anyhow::Result<()> {
        let event: E = serde_json::from_slice(payload).map_err(|e| DeliveryError::Decode {
            event_type: event_type.to_string(),
            reason: e.to_string(),
        })?;
        self.handler.handle(event).await
    }
}

/// Startup-built map from wire type tag to decode-and-dispatch route. Adding
/// an event type is a `register` call, nothing else changes.
#[derive(Default)]
pub struct HandlerRegistry {
    routes: HashMap<String, Box<dyn EventRoute>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E, H>(mut self, event_type: impl Into<String>, handler: Arc<H>) -> Self
    where
        E: DeserializeOwned + Send + 'static,
        H: IntegrationEventHandler<E> + 'static,
    {
        self.routes.insert(
            event_type.into(),
            Box::new(TypedRoute {
                handler,
                _event: PhantomData,
            }),
        );
        self
    }

    /// Decodes and runs the handler registered for `event_type`. Unknown tags
    /// are logged and reported as `Unhandled` so the caller can acknowledge
    /// and move on; decode and handler failures come back as errors.
    pub async fn dispatch(
        &self,
        event_type: &str,
        payload: &[u8],
    ) -> anyhow::Result<DispatchOutcome> {
        match self.routes.get(event_type) {
            Some(route) => {
                route.dispatch(event_type, payload).await?;
                Ok(DispatchOutcome::Handled)
            }
            None => {
                warn!(event_type, "no handler registered, discarding event");
                Ok(DispatchOutcome::Unhandled)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct ParcelShipped {
        parcel_id: String,
    }

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<ParcelShipped>>,
        fail: bool,
    }

    #[async_trait]
    impl IntegrationEventHandler<ParcelShipped> for RecordingHandler {
        async fn handle(&self, event: ParcelShipped) -> anyhow::Result<()> {
            self.seen.lock().await.push(event);
            if self.fail {
                anyhow::bail!("handler rejected event");
            }
            Ok(())
        }
    }

    fn payload() -> Vec<u8> {
        serde_json::to_vec(&ParcelShipped {
            parcel_id: "p-42".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let handler = Arc::new(RecordingHandler::default());
        let registry = HandlerRegistry::new().register("ParcelShipped", handler.clone());

        let outcome = registry.dispatch("ParcelShipped", &payload()).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Handled);
        let seen = handler.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].parcel_id, "p-42");
    }

    #[tokio::test]
    async fn unknown_tag_is_unhandled_and_touches_no_handler() {
        let handler = Arc::new(RecordingHandler::default());
        let registry = HandlerRegistry::new().register("ParcelShipped", handler.clone());

        let outcome = registry.dispatch("ParcelLost", &payload()).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Unhandled);
        assert!(handler.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn handler_error_propagates() {
        let handler = Arc::new(RecordingHandler {
            fail: true,
            ..Default::default()
        });
        let registry = HandlerRegistry::new().register("ParcelShipped", handler.clone());

        let result = registry.dispatch("ParcelShipped", &payload()).await;

        assert!(result.is_err());
        assert_eq!(handler.seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn garbage_payload_is_a_decode_error() {
        let handler = Arc::new(RecordingHandler::default());
        let registry = HandlerRegistry::new().register("ParcelShipped", handler.clone());

        let err = registry
            .dispatch("ParcelShipped", b"not json")
            .await
            .unwrap_err();

        let delivery = err.downcast::<DeliveryError>().unwrap();
        assert!(matches!(delivery, DeliveryError::Decode { .. }));
        assert!(handler.seen.lock().await.is_empty());
    }
}
