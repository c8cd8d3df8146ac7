pub mod outbox;

pub use outbox::{OutboxRecord, OutboxStats};
