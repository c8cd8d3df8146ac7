use std::sync::Arc;

use async_nats::HeaderMap;
use async_nats::jetstream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use super::connection::{BrokerChannel, ConnectionManager, RECONNECT_PAUSE};
use super::{EVENT_TYPE_HEADER, RETRY_COUNT_HEADER};
use crate::application::handlers::{DispatchOutcome, HandlerRegistry};
use crate::application::services::event_bus::EventBus;
use crate::domain::errors::DeliveryError;
use crate::domain::events::InboundEvent;
use crate::domain::value_objects::RetryPolicy;

/// Long-running subscription loop. Per message: ack on success, requeue with
/// an incremented retry header after an in-line backoff on failure, drop once
/// retries are exhausted. The backoff wait runs on the processing path, so
/// the consumer takes no new deliveries while backing off the current one;
/// deployments that cannot afford that pause would requeue through
/// broker-side delayed redelivery or a timer task instead of the in-line
/// wait.
pub struct EventConsumer {
    manager: Arc<ConnectionManager>,
    bus: Arc<dyn EventBus>,
    registry: Arc<HandlerRegistry>,
    retry_policy: RetryPolicy,
    shutdown: watch::Receiver<()>,
}

#[derive(Debug, PartialEq)]
enum Disposition {
    Ack,
    /// Leave the delivery unacked; the broker redelivers after ack_wait.
    Redeliver,
}

enum StreamEnd {
    Shutdown,
    ConnectionLost,
}

impl EventConsumer {
    pub fn new(
        manager: Arc<ConnectionManager>,
        bus: Arc<dyn EventBus>,
        registry: Arc<HandlerRegistry>,
        retry_policy: RetryPolicy,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            manager,
            bus,
            registry,
            retry_policy,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(err) = self.run().await {
                error!(error = ?err, "event consumer stopped");
            }
        })
    }

    /// Runs until shutdown. Returns an error only when the broker cannot be
    /// reached at startup; once subscribed, connection loss is absorbed by
    /// reconnecting.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut channel = self.manager.wait_until_ready().await?;
        info!(handlers = self.registry.len(), "event consumer started");

        loop {
            let messages = match channel.consumer.messages().await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(error = %err, "message stream unavailable");
                    self.manager.mark_disconnected().await;
                    match self.reconnect().await {
                        Some(next) => {
                            channel = next;
                            continue;
                        }
                        None => break,
                    }
                }
            };

            match self.pump(messages).await {
                StreamEnd::Shutdown => break,
                StreamEnd::ConnectionLost => {
                    self.manager.mark_disconnected().await;
                    match self.reconnect().await {
                        Some(next) => channel = next,
                        None => break,
                    }
                }
            }
        }

        info!("event consumer stopping");
        self.manager.shutdown().await;
        Ok(())
    }

    /// Drains one message stream until it breaks or shutdown is signalled.
    /// The in-flight message is always finished before either exit.
    async fn pump<S, E>(&mut self, mut messages: S) -> StreamEnd
    where
        S: tokio_stream::Stream<Item = Result<jetstream::Message, E>> + Unpin,
        E: std::fmt::Display,
    {
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => return StreamEnd::Shutdown,
                next = messages.next() => match next {
                    Some(Ok(message)) => {
                        let event = inbound_from_message(&message);
                        match self.handle_event(event).await {
                            Disposition::Ack => {
                                if let Err(err) = message.ack().await {
                                    warn!(error = %err, "failed to ack delivery");
                                    return StreamEnd::ConnectionLost;
                                }
                            }
                            Disposition::Redeliver => {}
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "message stream error");
                        return StreamEnd::ConnectionLost;
                    }
                    None => {
                        warn!("message stream closed");
                        return StreamEnd::ConnectionLost;
                    }
                }
            }
        }
    }

    async fn handle_event(&self, event: InboundEvent) -> Disposition {
        debug!(
            event_type = %event.event_type,
            retry_count = event.retry_count,
            "received event"
        );
        // dispatch runs on its own task: a handler panic comes back as a
        // join error and takes the failure path instead of unwinding the loop
        let registry = self.registry.clone();
        let event_type = event.event_type.clone();
        let payload = event.payload.clone();
        let dispatch = tokio::spawn(async move { registry.dispatch(&event_type, &payload).await });

        match dispatch.await {
            Ok(Ok(DispatchOutcome::Handled)) => {
                debug!(event_type = %event.event_type, "event handled");
                Disposition::Ack
            }
            // unknown tags are discarded, already logged by the registry
            Ok(Ok(DispatchOutcome::Unhandled)) => Disposition::Ack,
            Ok(Err(err)) => self.handle_failure(event, err).await,
            Err(join_err) => {
                let err = anyhow::Error::new(join_err).context("handler panicked");
                self.handle_failure(event, err).await
            }
        }
    }

    async fn handle_failure(&self, event: InboundEvent, err: anyhow::Error) -> Disposition {
        if self.retry_policy.is_exhausted(event.retry_count) {
            let exhausted = DeliveryError::Exhausted {
                event_type: event.event_type.clone(),
                attempts: event.retry_count.saturating_add(1),
                reason: err.to_string(),
            };
            error!(error = %exhausted, "dropping event");
            return Disposition::Ack;
        }

        let delay = self.retry_policy.delay_for(event.retry_count);
        warn!(
            event_type = %event.event_type,
            retry_count = event.retry_count,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "handler failed, waiting before requeue"
        );
        tokio::time::sleep(delay).await;

        // requeue carries the incremented header and must succeed before the
        // original is acked; a failed requeue leaves the original unacked so
        // the broker redelivers it
        let next_retry = event.retry_count + 1;
        match self
            .bus
            .publish(&event.event_type, &event.payload, next_retry)
            .await
        {
            Ok(()) => Disposition::Ack,
            Err(err) => {
                warn!(
                    event_type = %event.event_type,
                    error = %err,
                    "requeue failed, leaving delivery unacked"
                );
                Disposition::Redeliver
            }
        }
    }

    async fn reconnect(&mut self) -> Option<BrokerChannel> {
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => return None,
                _ = tokio::time::sleep(RECONNECT_PAUSE) => {
                    match self.manager.ensure_ready().await {
                        Ok(channel) => {
                            info!("reconnected to broker");
                            return Some(channel);
                        }
                        Err(err) => warn!(error = %err, "reconnect attempt failed"),
                    }
                }
            }
        }
    }
}

fn inbound_from_message(message: &jetstream::Message) -> InboundEvent {
    inbound_from_parts(
        message.subject.as_str(),
        message.headers.as_ref(),
        &message.payload,
    )
}

fn inbound_from_parts(subject: &str, headers: Option<&HeaderMap>, payload: &[u8]) -> InboundEvent {
    let event_type = headers
        .and_then(|h| h.get(EVENT_TYPE_HEADER))
        .map(|v| v.as_str().to_string())
        .unwrap_or_else(|| trailing_subject_token(subject).to_string());
    let retry_count = headers
        .and_then(|h| h.get(RETRY_COUNT_HEADER))
        .and_then(|v| v.as_str().parse().ok())
        .unwrap_or(0);
    InboundEvent {
        event_type,
        payload: payload.to_vec(),
        retry_count,
    }
}

fn trailing_subject_token(subject: &str) -> &str {
    subject.rsplit('.').next().unwrap_or(subject)
}
