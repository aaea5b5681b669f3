//! Store implementations: in-memory (tests/dev) and Postgres (durable).

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryOrderStore, InMemoryUserDirectory};
pub use postgres::{PostgresOrderStore, PostgresUserDirectory};
