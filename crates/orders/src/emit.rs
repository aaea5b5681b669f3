//! Outbound event plumbing.
//!
//! The engine enqueues events onto an unbounded channel through
//! [`OutboundSender`]; a delivery worker on the other end drains the channel
//! and publishes via an [`EventTransport`]. Enqueueing never blocks and never
//! fails the triggering operation, and publish failures are logged and
//! discarded by the worker.

use std::sync::Arc;
use std::sync::mpsc;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::events::{OutboundEvent, Topic};

/// Transport-level publish failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: Topic, reason: String },
}

impl TransportError {
    pub fn publish(topic: Topic, reason: impl Into<String>) -> Self {
        Self::Publish {
            topic,
            reason: reason.into(),
        }
    }
}

/// Downstream event transport (in-memory fan-out, Redis Streams, ...).
pub trait EventTransport: Send + Sync {
    fn publish(&self, event: OutboundEvent) -> Result<(), TransportError>;
}

impl<T> EventTransport for Arc<T>
where
    T: EventTransport + ?Sized,
{
    fn publish(&self, event: OutboundEvent) -> Result<(), TransportError> {
        (**self).publish(event)
    }
}

/// Create the engine-side sender and the worker-side receiver.
pub fn outbound_channel() -> (OutboundSender, mpsc::Receiver<OutboundEvent>) {
    let (tx, rx) = mpsc::channel();
    (OutboundSender { tx }, rx)
}

/// Fire-and-forget enqueue handle.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: mpsc::Sender<OutboundEvent>,
}

impl OutboundSender {
    /// Serialize and enqueue an event. Serialization or channel failures are
    /// logged and swallowed; the caller's operation already committed.
    pub fn emit<P: Serialize>(&self, topic: Topic, partition_key: impl Into<String>, payload: &P) {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(topic = %topic, error = %err, "event payload failed to serialize, dropping");
                return;
            }
        };

        let event = OutboundEvent {
            topic,
            partition_key: partition_key.into(),
            payload,
        };
        if self.tx.send(event).is_err() {
            warn!(topic = %topic, "outbound channel closed, dropping event");
        }
    }
}
