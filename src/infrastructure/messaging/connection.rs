use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{
    self,
    consumer::{AckPolicy, PullConsumer, pull},
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::errors::DeliveryError;

pub(crate) const RECONNECT_PAUSE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub url: String,
    pub client_name: String,
    pub connection_timeout: Duration,
    /// Bounds both the client's automatic reconnects and the startup
    /// reachability wait.
    pub max_reconnects: usize,
    pub stream: String,
    pub durable: String,
    pub subject_prefix: String,
    /// Which subjects the durable consumer sees; defaults to everything
    /// under the prefix.
    pub filter_subject: String,
    /// Backpressure knob: how many deliveries may sit unacked before the
    /// broker pauses. 1 keeps strict FIFO for a single consumer.
    pub prefetch: i64,
    /// Must outlast the longest in-line backoff, or the broker starts
    /// redelivering messages the consumer is still backing off on.
    pub ack_wait: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            client_name: "eventflow".to_string(),
            connection_timeout: Duration::from_secs(5),
            max_reconnects: 10,
            stream: "EVENTS".to_string(),
            durable: "eventflow-consumer".to_string(),
            subject_prefix: "events".to_string(),
            filter_subject: "events.>".to_string(),
            prefetch: 1,
            ack_wait: Duration::from_secs(120),
        }
    }
}

/// Live handles produced by one successful connect. Cloning shares the same
/// underlying connection.
#[derive(Clone)]
pub struct BrokerChannel {
    pub client: async_nats::Client,
    pub context: jetstream::Context,
    pub consumer: PullConsumer,
}

enum ConnectionState {
    Disconnected,
    Connecting,
    Ready(BrokerChannel),
}

/// Owns the connection lifecycle: Disconnected -> Connecting -> Ready, and
/// back to Disconnected when a caller reports the link dead. The mutex
/// serializes transitions so concurrent callers never open duplicate
/// connections; whoever finds Ready returns the existing handles without
/// re-declaring topology.
pub struct ConnectionManager {
    config: BrokerConfig,
    state: Mutex<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(config: BrokerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(ConnectionState::Disconnected),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Returns the current channel, connecting and declaring topology first
    /// if necessary. One attempt; use `wait_until_ready` for the bounded
    /// startup wait.
    pub async fn ensure_ready(&self) -> anyhow::Result<BrokerChannel> {
        let mut state = self.state.lock().await;
        if let ConnectionState::Ready(channel) = &*state {
            return Ok(channel.clone());
        }

        *state = ConnectionState::Connecting;
        match self.connect().await {
            Ok(channel) => {
                *state = ConnectionState::Ready(channel.clone());
                Ok(channel)
            }
            Err(err) => {
                *state = ConnectionState::Disconnected;
                Err(DeliveryError::Connection(err.to_string()).into())
            }
        }
    }

    /// Bounded startup wait: `max_reconnects` attempts with a fixed pause.
    /// Failing all of them is the caller's fatal condition.
    pub async fn wait_until_ready(&self) -> anyhow::Result<BrokerChannel> {
        let attempts = self.config.max_reconnects.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.ensure_ready().await {
                Ok(channel) => return Ok(channel),
                Err(err) if attempt < attempts => {
                    warn!(attempt, error = %err, "broker not reachable yet");
                    tokio::time::sleep(RECONNECT_PAUSE).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Callers report publish/consume failures here; the next `ensure_ready`
    /// reconnects and re-declares from scratch.
    pub async fn mark_disconnected(&self) {
        let mut state = self.state.lock().await;
        *state = ConnectionState::Disconnected;
    }

    pub async fn is_ready(&self) -> bool {
        matches!(&*self.state.lock().await, ConnectionState::Ready(_))
    }

    /// Flushes what it can and drops the handles. Cleanup errors are
    /// swallowed; the lock is released in every path.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let ConnectionState::Ready(channel) = &*state {
            let _ = channel.client.flush().await;
        }
        *state = ConnectionState::Disconnected;
    }

    async fn connect(&self) -> anyhow::Result<BrokerChannel> {
        let client = async_nats::ConnectOptions::new()
            .name(&self.config.client_name)
            .connection_timeout(self.config.connection_timeout)
            .max_reconnects(self.config.max_reconnects)
            .connect(&self.config.url)
            .await?;
        let context = jetstream::new(client.clone());

        let stream = context
            .get_or_create_stream(jetstream::stream::Config {
                name: self.config.stream.clone(),
                subjects: vec![format!("{}.>", self.config.subject_prefix)],
                ..Default::default()
            })
            .await?;

        let consumer = stream
            .get_or_create_consumer(
                &self.config.durable,
                pull::Config {
                    durable_name: Some(self.config.durable.clone()),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: self.config.ack_wait,
                    filter_subject: self.config.filter_subject.clone(),
                    max_ack_pending: self.config.prefetch,
                    ..Default::default()
                },
            )
            .await?;

        info!(
            url = %self.config.url,
            stream = %self.config.stream,
            durable = %self.config.durable,
            filter = %self.config.filter_subject,
            prefetch = self.config.prefetch,
            "connected to broker and declared topology"
        );

        Ok(BrokerChannel {
            client,
            context,
            consumer,
        })
    }
}
