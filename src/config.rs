use std::env::var;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

use crate::domain::value_objects::RetryPolicy;
use crate::infrastructure::messaging::{BrokerConfig, RelayConfig};

pub struct Config {
    pub broker: BrokerConfig,
    pub retry: RetryPolicy,
    pub relay: RelayConfig,
    /// Only the relay daemon needs this; consumers built on the in-memory
    /// store run without it.
    pub database_url: Option<String>,
}

impl Config {
    pub fn try_parse() -> Result<Config, String> {
        let _ = dotenv();

        let broker_defaults = BrokerConfig::default();
        let retry_defaults = RetryPolicy::default();
        let relay_defaults = RelayConfig::default();

        let subject_prefix = var_or("BROKER_SUBJECT_PREFIX", &broker_defaults.subject_prefix);
        let filter_subject =
            var("BROKER_ROUTING_PATTERN").unwrap_or_else(|_| format!("{subject_prefix}.>"));

        Ok(Config {
            broker: BrokerConfig {
                url: var_or("BROKER_URL", &broker_defaults.url),
                client_name: var_or("BROKER_CLIENT_NAME", &broker_defaults.client_name),
                connection_timeout: Duration::from_secs(parse_or(
                    "BROKER_CONNECTION_TIMEOUT_SECS",
                    broker_defaults.connection_timeout.as_secs(),
                )?),
                max_reconnects: parse_or("BROKER_MAX_RECONNECTS", broker_defaults.max_reconnects)?,
                stream: var_or("BROKER_STREAM", &broker_defaults.stream),
                durable: var_or("BROKER_CONSUMER", &broker_defaults.durable),
                subject_prefix,
                filter_subject,
                prefetch: parse_or("BROKER_PREFETCH", broker_defaults.prefetch)?,
                ack_wait: Duration::from_secs(parse_or(
                    "BROKER_ACK_WAIT_SECS",
                    broker_defaults.ack_wait.as_secs(),
                )?),
            },
            retry: RetryPolicy {
                max_retries: parse_or("CONSUMER_MAX_RETRIES", retry_defaults.max_retries)?,
                initial_backoff: Duration::from_millis(parse_or(
                    "CONSUMER_INITIAL_BACKOFF_MS",
                    retry_defaults.initial_backoff.as_millis() as u64,
                )?),
                backoff_multiplier: parse_or(
                    "CONSUMER_BACKOFF_MULTIPLIER",
                    retry_defaults.backoff_multiplier,
                )?,
                backoff_cap: Duration::from_millis(parse_or(
                    "CONSUMER_BACKOFF_CAP_MS",
                    retry_defaults.backoff_cap.as_millis() as u64,
                )?),
            },
            relay: RelayConfig {
                poll_interval: Duration::from_millis(parse_or(
                    "RELAY_POLL_INTERVAL_MS",
                    relay_defaults.poll_interval.as_millis() as u64,
                )?),
                batch_size: parse_or("RELAY_BATCH_SIZE", relay_defaults.batch_size)?,
            },
            database_url: var("DATABASE_URL").ok(),
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: FromStr>(name: &str, default: T) -> Result<T, String> {
    match var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| format!("An error occured while parsing {name} env param")),
        Err(_) => Ok(default),
    }
}
