//! Infrastructure layer: stores, caches, transports, workers.

pub mod cache;
pub mod store;
pub mod transport;
pub mod workers;

mod integration_tests;

pub use cache::InMemoryCache;
pub use store::{InMemoryOrderStore, InMemoryUserDirectory, PostgresOrderStore, PostgresUserDirectory};
pub use transport::{InMemoryTransport, Subscription};
pub use workers::{DeliveryWorker, NotificationWorker, WorkerHandle};

#[cfg(feature = "redis")]
pub use cache::RedisCache;
#[cfg(feature = "redis")]
pub use transport::RedisStreamsTransport;
