use anyhow::anyhow;
use sqlx::postgres::PgPoolOptions;
use tokio::main;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eventflow::config::Config;
use eventflow::infrastructure::messaging::{ConnectionManager, JetStreamEventBus, OutboxRelay};
use eventflow::infrastructure::repositories::{PostgresOutboxRepository, run_migrations};

#[main]
async fn main() -> anyhow::Result<()> {
    let config = Config::try_parse().map_err(|e| anyhow!(e))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url = config
        .database_url
        .ok_or_else(|| anyhow!("An error occured while getting DATABASE_URL env param"))?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    run_migrations(&pool).await?;
    let repository = PostgresOutboxRepository::new(pool);

    let manager = ConnectionManager::new(config.broker);
    manager.wait_until_ready().await?;
    let bus = JetStreamEventBus::new(manager.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let relay = OutboxRelay::new(repository, bus, config.relay, shutdown_rx);
    let handle = relay.spawn();

    signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(());
    handle.await?;
    manager.shutdown().await;

    Ok(())
}
