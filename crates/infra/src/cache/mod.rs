//! Cache implementations: in-memory (tests/dev) and Redis (feature-gated).

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use in_memory::InMemoryCache;
#[cfg(feature = "redis")]
pub use redis::RedisCache;
