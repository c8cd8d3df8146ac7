pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryOutboxRepository;
pub use postgres::{PgPool, PostgresOutboxRepository, run_migrations};
