//! Redis Streams transport (`--features redis`).
//!
//! Publishes each event with XADD to a per-topic stream
//! (`storefront:<topic>`), carrying the partition key and the JSON payload as
//! fields. Durable, at-least-once on the consumer side; this engine only owns
//! the publish side.

use std::sync::Arc;

use tracing::instrument;

use storefront_orders::emit::{EventTransport, TransportError};
use storefront_orders::events::OutboundEvent;

const STREAM_PREFIX: &str = "storefront";

#[derive(Debug, Clone)]
pub struct RedisStreamsTransport {
    client: Arc<redis::Client>,
}

impl RedisStreamsTransport {
    /// Connect lazily to the given URL (e.g. `redis://localhost:6379`).
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url.as_ref())?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    fn stream_key(topic: &str) -> String {
        format!("{STREAM_PREFIX}:{topic}")
    }
}

impl EventTransport for RedisStreamsTransport {
    #[instrument(skip(self, event), fields(topic = %event.topic, key = %event.partition_key))]
    fn publish(&self, event: OutboundEvent) -> Result<(), TransportError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| TransportError::publish(event.topic, e.to_string()))?;

        let stream = Self::stream_key(event.topic.as_str());
        let payload = event.payload.to_string();

        let _: String = redis::cmd("XADD")
            .arg(&stream)
            .arg("*")
            .arg("partition_key")
            .arg(&event.partition_key)
            .arg("payload")
            .arg(&payload)
            .query(&mut conn)
            .map_err(|e| TransportError::publish(event.topic, format!("XADD failed: {e}")))?;

        Ok(())
    }
}
