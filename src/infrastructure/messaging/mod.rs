pub mod connection;
pub mod consumer;
pub mod publisher;
pub mod relay;

pub use connection::{BrokerChannel, BrokerConfig, ConnectionManager};
pub use consumer::EventConsumer;
pub use publisher::JetStreamEventBus;
pub use relay::{OutboxRelay, RelayConfig, RelayCycle};

/// Wire type tag, the routing key for the handler registry.
pub const EVENT_TYPE_HEADER: &str = "X-Event-Type";
/// How many requeues this delivery has been through already; absent means 0.
pub const RETRY_COUNT_HEADER: &str = "X-Retry-Count";
