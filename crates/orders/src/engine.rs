//! Order lifecycle engine.
//!
//! Every mutating operation follows the same shape:
//!
//! 1. validate the request (no writes yet)
//! 2. run every check and write inside one store unit of work
//! 3. commit
//! 4. evict affected cache entries
//! 5. enqueue outbound events
//!
//! Steps 4 and 5 run strictly after commit and can never fail the operation.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::instrument;

use storefront_core::{DomainError, DomainResult, OrderId, Page, PageRequest, UserId};

use crate::cache::{
    self, ALL_LIST_TTL, ALL_ORDERS_NS, Cache, ORDER_TTL, OWNER_LIST_TTL, PRODUCT_NS,
    all_orders_page_key, order_key, owner_orders_key,
};
use crate::emit::OutboundSender;
use crate::events::{
    InventoryDeltaEvent, OrderCreatedEvent, OrderStatusChangedEvent, StockChangeReason, Topic,
};
use crate::ledger::{StockChange, deduct_stock, restore_stock};
use crate::model::{
    NewOrder, Order, OrderLine, OrderNumber, OrderStatus, OrderUpdate, PaymentStatus,
    validate_lines,
};
use crate::store::{OrderFilter, OrderSort, OrderStore, StoreTx, UserDirectory};

/// The order-inventory consistency engine.
#[derive(Clone)]
pub struct OrderEngine {
    store: Arc<dyn OrderStore>,
    users: Arc<dyn UserDirectory>,
    cache: Arc<dyn Cache>,
    outbound: OutboundSender,
}

impl OrderEngine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        users: Arc<dyn UserDirectory>,
        cache: Arc<dyn Cache>,
        outbound: OutboundSender,
    ) -> Self {
        Self {
            store,
            users,
            cache,
            outbound,
        }
    }

    /// Place a new order, deducting stock for every line atomically.
    #[instrument(skip(self, input), fields(user = %input.user_id))]
    pub fn create_order(&self, input: NewOrder) -> DomainResult<Order> {
        validate_lines(&input.lines)?;
        if !self.users.exists(input.user_id)? {
            return Err(DomainError::not_found("user", input.user_id));
        }

        let mut tx = self.store.begin()?;
        let mut lines = Vec::with_capacity(input.lines.len());
        let mut changes = Vec::with_capacity(input.lines.len());
        for requested in &input.lines {
            let (product, change) =
                deduct_stock(tx.as_mut(), requested.product_id, requested.quantity)?;
            lines.push(OrderLine::snapshot(&product, requested.quantity));
            changes.push(change);
        }

        let now = Utc::now();
        let id = OrderId::new();
        let mut order = Order {
            id,
            order_number: OrderNumber::derive(id),
            user_id: input.user_id,
            status: OrderStatus::Pending,
            total_amount: Decimal::ZERO,
            total_items: 0,
            shipping_address: input.shipping_address,
            billing_address: input.billing_address,
            payment_method: input.payment_method,
            payment_status: None,
            notes: input.notes,
            lines: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        order.replace_lines(lines, now);

        tx.insert_order(&order)?;
        tx.commit()?;

        self.evict_after_write(&order, true);
        self.outbound.emit(
            Topic::Orders,
            order.id.to_string(),
            &OrderCreatedEvent::from_order(&order),
        );
        self.emit_inventory_deltas(&changes, StockChangeReason::OrderCreated, Some(order.id));

        Ok(order)
    }

    /// Apply a status transition. Transitioning to `Cancelled` restores stock
    /// and marks the payment refunded; every transition emits a status event.
    #[instrument(skip(self), fields(order = %id, status = %new_status))]
    pub fn update_order_status(&self, id: OrderId, new_status: OrderStatus) -> DomainResult<Order> {
        let mut tx = self.store.begin()?;
        let mut order = tx
            .get_order(id)?
            .ok_or_else(|| DomainError::not_found("order", id))?;

        let old_status = order.status;
        let mut changes = Vec::new();
        if new_status == OrderStatus::Cancelled && old_status != OrderStatus::Cancelled {
            changes = restore_order_lines(tx.as_mut(), &order)?;
            order.payment_status = Some(PaymentStatus::Refunded);
        }

        order.status = new_status;
        order.updated_at = Utc::now();
        tx.update_order(&order)?;
        tx.commit()?;

        self.evict_after_write(&order, !changes.is_empty());
        self.emit_status_changed(&order, old_status, new_status);
        self.emit_inventory_deltas(&changes, StockChangeReason::OrderCancelled, Some(order.id));

        Ok(order)
    }

    /// Replace an order's line set: restore everything currently held, then
    /// deduct the new set against the restored levels, in one unit of work.
    #[instrument(skip(self, update), fields(order = %id))]
    pub fn update_order(&self, id: OrderId, update: OrderUpdate) -> DomainResult<Order> {
        validate_lines(&update.lines)?;

        let mut tx = self.store.begin()?;
        let mut order = tx
            .get_order(id)?
            .ok_or_else(|| DomainError::not_found("order", id))?;
        if order.is_cancelled() {
            return Err(DomainError::invalid_state(format!(
                "order {} is cancelled and cannot be updated",
                order.order_number
            )));
        }

        let restored = restore_order_lines(tx.as_mut(), &order)?;

        let mut lines = Vec::with_capacity(update.lines.len());
        let mut deducted = Vec::with_capacity(update.lines.len());
        for requested in &update.lines {
            let (product, change) =
                deduct_stock(tx.as_mut(), requested.product_id, requested.quantity)?;
            lines.push(OrderLine::snapshot(&product, requested.quantity));
            deducted.push(change);
        }

        if let Some(shipping) = update.shipping_address {
            order.shipping_address = shipping;
        }
        if let Some(billing) = update.billing_address {
            order.billing_address = Some(billing);
        }
        if let Some(payment_method) = update.payment_method {
            order.payment_method = Some(payment_method);
        }
        if let Some(notes) = update.notes {
            order.notes = Some(notes);
        }
        order.replace_lines(lines, Utc::now());

        tx.update_order(&order)?;
        tx.commit()?;

        self.evict_after_write(&order, true);
        self.emit_inventory_deltas(
            &restored,
            StockChangeReason::OrderUpdatedItemRemoved,
            Some(order.id),
        );
        self.emit_inventory_deltas(&deducted, StockChangeReason::OrderUpdated, Some(order.id));

        Ok(order)
    }

    /// Cancel an order. Idempotent: cancelling an already-cancelled order
    /// returns it unchanged with no stock mutation and no events.
    #[instrument(skip(self), fields(order = %id))]
    pub fn cancel_order(&self, id: OrderId) -> DomainResult<Order> {
        let mut tx = self.store.begin()?;
        let mut order = tx
            .get_order(id)?
            .ok_or_else(|| DomainError::not_found("order", id))?;
        if order.is_cancelled() {
            return Ok(order);
        }

        let old_status = order.status;
        let changes = restore_order_lines(tx.as_mut(), &order)?;
        order.status = OrderStatus::Cancelled;
        order.payment_status = Some(PaymentStatus::Refunded);
        order.updated_at = Utc::now();
        tx.update_order(&order)?;
        tx.commit()?;

        self.evict_after_write(&order, true);
        self.emit_status_changed(&order, old_status, OrderStatus::Cancelled);
        self.emit_inventory_deltas(&changes, StockChangeReason::OrderCancelled, Some(order.id));

        Ok(order)
    }

    /// Hard-delete an order, restoring its stock first unless it was already
    /// cancelled (cancellation restored it). Emits no events.
    #[instrument(skip(self), fields(order = %id))]
    pub fn delete_order(&self, id: OrderId) -> DomainResult<()> {
        let mut tx = self.store.begin()?;
        let order = tx
            .get_order(id)?
            .ok_or_else(|| DomainError::not_found("order", id))?;

        let restored = if order.is_cancelled() {
            Vec::new()
        } else {
            restore_order_lines(tx.as_mut(), &order)?
        };
        tx.delete_order(id)?;
        tx.commit()?;

        self.evict_after_write(&order, !restored.is_empty());
        Ok(())
    }

    /// Fetch one order, read-through the `order:` cache.
    #[instrument(skip(self), fields(order = %id))]
    pub fn get_order(&self, id: OrderId) -> DomainResult<Order> {
        let key = order_key(id);
        if let Some(order) = cache::get_as::<Order>(self.cache.as_ref(), &key) {
            return Ok(order);
        }

        let order = self
            .store
            .find_order(id)?
            .ok_or_else(|| DomainError::not_found("order", id))?;
        cache::put_json(self.cache.as_ref(), &key, &order, ORDER_TTL);
        Ok(order)
    }

    /// All orders for one owner, read-through the `orders:owner:` cache.
    #[instrument(skip(self), fields(user = %owner))]
    pub fn orders_by_owner(&self, owner: UserId) -> DomainResult<Vec<Order>> {
        let key = owner_orders_key(owner);
        if let Some(orders) = cache::get_as::<Vec<Order>>(self.cache.as_ref(), &key) {
            return Ok(orders);
        }

        let page = self.store.list_orders(
            OrderFilter::Owner(owner),
            PageRequest::new(0, u32::MAX),
            OrderSort::default(),
        )?;
        cache::put_json(self.cache.as_ref(), &key, &page.items, OWNER_LIST_TTL);
        Ok(page.items)
    }

    /// One page of all orders, read-through the `orders:all` namespace.
    #[instrument(skip(self))]
    pub fn all_orders(&self, page: PageRequest, sort: OrderSort) -> DomainResult<Page<Order>> {
        let key = all_orders_page_key(
            page.page,
            page.size,
            sort.field.as_str(),
            match sort.direction {
                storefront_core::SortDirection::Asc => "asc",
                storefront_core::SortDirection::Desc => "desc",
            },
        );
        if let Some(cached) = cache::get_as::<Page<Order>>(self.cache.as_ref(), &key) {
            return Ok(cached);
        }

        let result = self.store.list_orders(OrderFilter::All, page, sort)?;
        cache::put_json(self.cache.as_ref(), &key, &result, ALL_LIST_TTL);
        Ok(result)
    }

    /// One page of orders in a given status. Not cached; status churns.
    #[instrument(skip(self), fields(status = %status))]
    pub fn orders_by_status(
        &self,
        status: OrderStatus,
        page: PageRequest,
        sort: OrderSort,
    ) -> DomainResult<Page<Order>> {
        Ok(self
            .store
            .list_orders(OrderFilter::Status(status), page, sort)?)
    }

    fn evict_after_write(&self, order: &Order, stock_touched: bool) {
        self.cache.evict(&order_key(order.id));
        self.cache.evict(&owner_orders_key(order.user_id));
        self.cache.evict_namespace(ALL_ORDERS_NS);
        if stock_touched {
            self.cache.evict_namespace(PRODUCT_NS);
        }
    }

    fn emit_status_changed(&self, order: &Order, old: OrderStatus, new: OrderStatus) {
        self.outbound.emit(
            Topic::OrderStatus,
            order.id.to_string(),
            &OrderStatusChangedEvent {
                order_id: order.id,
                order_number: order.order_number.to_string(),
                user_id: order.user_id,
                old_status: old,
                new_status: new,
                changed_at: order.updated_at,
            },
        );
    }

    fn emit_inventory_deltas(
        &self,
        changes: &[StockChange],
        reason: StockChangeReason,
        order_id: Option<OrderId>,
    ) {
        let occurred_at = Utc::now();
        for change in changes {
            self.outbound.emit(
                Topic::Inventory,
                change.product_id.to_string(),
                &InventoryDeltaEvent {
                    product_id: change.product_id,
                    product_name: change.product_name.clone(),
                    stock_before: change.before,
                    stock_after: change.after,
                    quantity_changed: change.delta(),
                    reason,
                    order_id,
                    occurred_at,
                },
            );
        }
    }
}

/// Restore stock for every line of an order, skipping vanished products.
fn restore_order_lines(tx: &mut dyn StoreTx, order: &Order) -> DomainResult<Vec<StockChange>> {
    let mut changes = Vec::with_capacity(order.lines.len());
    for line in &order.lines {
        if let Some(change) = restore_stock(tx, line.product_id, line.quantity)? {
            changes.push(change);
        }
    }
    Ok(changes)
}
