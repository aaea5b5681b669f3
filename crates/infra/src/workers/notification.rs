//! Notification worker: turns committed order events into user notifications.
//!
//! Consumes the `orders` topic from a transport subscription and enqueues a
//! `NotificationEvent` per order back through the outbound channel, where the
//! delivery worker routes it to the `notifications` topic.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::warn;

use storefront_orders::emit::OutboundSender;
use storefront_orders::events::{NotificationEvent, OrderCreatedEvent, Topic};

use super::WorkerHandle;
use crate::transport::Subscription;

#[derive(Debug)]
pub struct NotificationWorker;

impl NotificationWorker {
    /// Spawn against a subscription to the `orders` topic.
    pub fn spawn(orders: Subscription, outbound: OutboundSender) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("order-notifications".to_string())
            .spawn(move || notification_loop(orders, shutdown_rx, outbound))
            .expect("failed to spawn notification worker thread");

        WorkerHandle::new(shutdown_tx, join)
    }
}

fn notification_loop(orders: Subscription, shutdown_rx: Receiver<()>, outbound: OutboundSender) {
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match orders.recv_timeout(tick) {
            Ok(event) => {
                let created: OrderCreatedEvent = match serde_json::from_value(event.payload) {
                    Ok(created) => created,
                    Err(err) => {
                        warn!(error = %err, "unparseable order event, skipping notification");
                        continue;
                    }
                };

                let notification = NotificationEvent {
                    user_id: created.user_id,
                    kind: "ORDER_CREATED".to_string(),
                    message: format!(
                        "Order {} confirmed: {} item(s), total {}",
                        created.order_number, created.total_items, created.total_amount
                    ),
                    occurred_at: created.created_at,
                };
                outbound.emit(
                    Topic::Notifications,
                    created.user_id.to_string(),
                    &notification,
                );
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
