//! Event transports: in-memory fan-out (tests/dev) and Redis Streams.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_streams;

pub use in_memory::{InMemoryTransport, Subscription};
#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsTransport;
