//! Delivery worker: drains the engine's outbound channel into a transport.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::warn;

use storefront_orders::emit::EventTransport;
use storefront_orders::events::OutboundEvent;

use super::WorkerHandle;

/// Drains [`OutboundEvent`]s and publishes them. Publish failures are logged
/// and the event is discarded; delivery is fire-and-forget by contract.
#[derive(Debug)]
pub struct DeliveryWorker;

impl DeliveryWorker {
    pub fn spawn<T>(events: Receiver<OutboundEvent>, transport: T) -> WorkerHandle
    where
        T: EventTransport + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("outbound-delivery".to_string())
            .spawn(move || delivery_loop(events, shutdown_rx, transport))
            .expect("failed to spawn delivery worker thread");

        WorkerHandle::new(shutdown_tx, join)
    }
}

fn delivery_loop<T>(events: Receiver<OutboundEvent>, shutdown_rx: Receiver<()>, transport: T)
where
    T: EventTransport,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match events.recv_timeout(tick) {
            Ok(event) => {
                let topic = event.topic;
                if let Err(err) = transport.publish(event) {
                    warn!(topic = %topic, error = %err, "event publish failed, dropping");
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
