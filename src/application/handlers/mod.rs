use async_trait::async_trait;

pub mod registry;

pub use registry::{DispatchOutcome, HandlerRegistry};

/// In-process reaction to one integration event type. Implementations must be
/// idempotent: the delivery contract is at-least-once, so the same event can
/// arrive more than once. Returning an error puts the delivery on the retry
/// path; cancellation arrives by dropping the consumer task, not as an
/// argument.
#[async_trait]
pub trait IntegrationEventHandler<E: Send + 'static>: Send + Sync {
    async fn handle(&self, event: E) -> anyhow::Result<()>;
}
