//! Reliable integration-event delivery: a transactional outbox drained by a
//! broker relay on the producing side, and a subscribing consumer with
//! bounded backoff retry on the receiving side. Delivery is at least once;
//! handlers are expected to tolerate duplicates.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::handlers::{DispatchOutcome, HandlerRegistry, IntegrationEventHandler};
pub use application::services::event_bus::EventBus;
pub use config::Config;
pub use domain::errors::DeliveryError;
pub use domain::events::{InboundEvent, IntegrationEvent};
pub use domain::models::{OutboxRecord, OutboxStats};
pub use domain::repositories::OutboxRepository;
pub use domain::value_objects::RetryPolicy;
pub use infrastructure::messaging::{
    BrokerConfig, ConnectionManager, EventConsumer, JetStreamEventBus, OutboxRelay, RelayConfig,
    RelayCycle,
};
pub use infrastructure::repositories::{
    InMemoryOutboxRepository, PgPool, PostgresOutboxRepository, run_migrations,
};
