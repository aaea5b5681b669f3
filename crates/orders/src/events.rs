//! Outbound event model.
//!
//! Events are fire-and-forget: they are emitted after the owning transaction
//! commits and are never persisted by this engine. Consumers must tolerate
//! duplicates and loss.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use storefront_core::{OrderId, ProductId, UserId};

use crate::model::{Order, OrderStatus};

/// Destination topic for an outbound event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    Orders,
    OrderStatus,
    Inventory,
    Notifications,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Orders => "orders",
            Topic::OrderStatus => "order-status",
            Topic::Inventory => "inventory",
            Topic::Notifications => "notifications",
        }
    }
}

impl core::fmt::Display for Topic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stock level changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockChangeReason {
    OrderCreated,
    OrderCancelled,
    OrderUpdated,
    OrderUpdatedItemRemoved,
}

/// Per-line summary carried on `OrderCreatedEvent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineSummary {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub subtotal: Decimal,
}

/// Published to `orders` after an order commits. Partition key: order id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub total_amount: Decimal,
    pub total_items: u32,
    pub lines: Vec<OrderLineSummary>,
    pub shipping_address: String,
    pub created_at: DateTime<Utc>,
}

impl OrderCreatedEvent {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.to_string(),
            user_id: order.user_id,
            total_amount: order.total_amount,
            total_items: order.total_items,
            lines: order
                .lines
                .iter()
                .map(|l| OrderLineSummary {
                    product_id: l.product_id,
                    product_name: l.product_name.clone(),
                    unit_price: l.unit_price,
                    quantity: l.quantity,
                    subtotal: l.subtotal,
                })
                .collect(),
            shipping_address: order.shipping_address.clone(),
            created_at: order.created_at,
        }
    }
}

/// Published to `order-status` on every status transition. Partition key:
/// order id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    pub order_id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub changed_at: DateTime<Utc>,
}

/// Published to `inventory` for every committed stock mutation. Partition
/// key: product id, so per-product deltas stay ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryDeltaEvent {
    pub product_id: ProductId,
    pub product_name: String,
    pub stock_before: u32,
    pub stock_after: u32,
    /// Signed: negative for deductions, positive for restores.
    pub quantity_changed: i64,
    pub reason: StockChangeReason,
    pub order_id: Option<OrderId>,
    pub occurred_at: DateTime<Utc>,
}

/// Published to `notifications` by the notification worker. Partition key:
/// user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub user_id: UserId,
    pub kind: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// A serialized event bound for a topic partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub topic: Topic,
    pub partition_key: String,
    pub payload: serde_json::Value,
}
