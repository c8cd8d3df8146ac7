use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::application::services::event_bus::EventBus;
use crate::domain::repositories::OutboxRepository;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub batch_size: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 50,
        }
    }
}

/// What one drain pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayCycle {
    pub published: u32,
    pub failed: u32,
}

/// Periodic task bridging committed outbox rows to the broker. Rows are
/// published oldest first and only marked processed after the broker
/// accepted them; a row whose publish fails keeps its error and stays
/// pending for the next pass, with no retry ceiling on this side.
pub struct OutboxRelay {
    repository: Arc<dyn OutboxRepository>,
    bus: Arc<dyn EventBus>,
    config: RelayConfig,
    shutdown: watch::Receiver<()>,
}

impl OutboxRelay {
    pub fn new(
        repository: Arc<dyn OutboxRepository>,
        bus: Arc<dyn EventBus>,
        config: RelayConfig,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            repository,
            bus,
            config,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(err) = self.run().await {
                error!(error = ?err, "outbox relay stopped");
            }
        })
    }

    /// Runs until shutdown. Cycles execute inside the poll task itself, so
    /// two drain passes never overlap.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "outbox relay started"
        );
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                _ = ticker.tick() => match self.run_cycle().await {
                    Ok(cycle) if cycle != RelayCycle::default() => {
                        debug!(
                            published = cycle.published,
                            failed = cycle.failed,
                            "outbox drained"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "outbox drain failed"),
                },
            }
        }

        info!("outbox relay stopping");
        Ok(())
    }

    /// One drain pass: fetch the oldest pending rows and publish them in
    /// fetch order. The wire retry count is always 0 here; the row's own
    /// retry count only tracks failed relay attempts for operators.
    pub async fn run_cycle(&self) -> anyhow::Result<RelayCycle> {
        let batch = self
            .repository
            .fetch_unprocessed(self.config.batch_size)
            .await?;
        let mut cycle = RelayCycle::default();

        for record in batch {
            let payload = serde_json::to_vec(&record.payload)?;
            match self.bus.publish(&record.event_type, &payload, 0).await {
                Ok(()) => {
                    self.repository.mark_processed(record.id).await?;
                    debug!(id = %record.id, event_type = %record.event_type, "relayed event");
                    cycle.published += 1;
                }
                Err(err) => {
                    warn!(
                        id = %record.id,
                        event_type = %record.event_type,
                        error = %err,
                        "failed to relay event"
                    );
                    self.repository
                        .mark_failed(record.id, &err.to_string(), record.retry_count + 1)
                        .await?;
                    cycle.failed += 1;
                }
            }
        }

        Ok(cycle)
    }
}
