//! In-memory transport for tests and development.
//!
//! Records everything it publishes and fans events out to topic-filtered
//! subscribers. Best-effort: dead subscribers are dropped while publishing.

use std::sync::mpsc::{self, Receiver};
use std::sync::Mutex;
use std::time::Duration;

use storefront_orders::emit::{EventTransport, TransportError};
use storefront_orders::events::{OutboundEvent, Topic};

/// A topic subscription backed by a channel.
#[derive(Debug)]
pub struct Subscription {
    receiver: Receiver<OutboundEvent>,
}

impl Subscription {
    pub fn new(receiver: Receiver<OutboundEvent>) -> Self {
        Self { receiver }
    }

    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<OutboundEvent, mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<OutboundEvent, mpsc::TryRecvError> {
        self.receiver.try_recv()
    }
}

#[derive(Debug, Default)]
struct Subscribers {
    senders: Vec<(Option<Topic>, mpsc::Sender<OutboundEvent>)>,
}

/// In-memory pub/sub transport.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    subscribers: Mutex<Subscribers>,
    published: Mutex<Vec<OutboundEvent>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one topic, or to everything with `None`.
    pub fn subscribe(&self, topic: Option<Topic>) -> Subscription {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.senders.push((topic, tx));
        }
        Subscription::new(rx)
    }

    /// Everything published so far. Test helper.
    pub fn published(&self) -> Vec<OutboundEvent> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Published events on one topic. Test helper.
    pub fn published_on(&self, topic: Topic) -> Vec<OutboundEvent> {
        self.published()
            .into_iter()
            .filter(|e| e.topic == topic)
            .collect()
    }
}

impl EventTransport for InMemoryTransport {
    fn publish(&self, event: OutboundEvent) -> Result<(), TransportError> {
        self.published
            .lock()
            .map_err(|_| TransportError::publish(event.topic, "transport lock poisoned"))?
            .push(event.clone());

        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| TransportError::publish(event.topic, "transport lock poisoned"))?;
        subs.senders
            .retain(|(topic, tx)| match topic {
                Some(t) if *t != event.topic => true,
                _ => tx.send(event.clone()).is_ok(),
            });
        Ok(())
    }
}
