//! Orders domain module.
//!
//! Contains the order model, the outbound event model, the collaborator
//! contracts (store, cache, transport, user directory) and the lifecycle
//! engine that ties them together. Implementations of the contracts live in
//! `storefront-infra`; this crate has no IO of its own.

pub mod cache;
pub mod emit;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod model;
pub mod store;

pub use cache::Cache;
pub use emit::{EventTransport, OutboundSender, TransportError, outbound_channel};
pub use engine::OrderEngine;
pub use events::{
    InventoryDeltaEvent, NotificationEvent, OrderCreatedEvent, OrderStatusChangedEvent,
    OutboundEvent, StockChangeReason, Topic,
};
pub use model::{NewOrder, NewOrderLine, Order, OrderLine, OrderNumber, OrderStatus, OrderUpdate, PaymentStatus};
pub use store::{OrderFilter, OrderSort, OrderSortField, OrderStore, StoreError, StoreTx, UserDirectory};
