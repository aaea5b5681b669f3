//! Integration tests for the full order pipeline.
//!
//! Engine → Store (unit of work) → Cache eviction → Outbound events.
//!
//! Verifies atomicity of multi-line stock mutations, idempotent cancellation,
//! cache read-through/eviction, and that side-effect failures never fail the
//! triggering operation.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::mpsc::Receiver;
    use std::time::Duration;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::Value as JsonValue;

    use storefront_catalog::NewProduct;
    use storefront_core::{DomainError, PageRequest, ProductId, SortDirection, UserId};
    use storefront_orders::cache::{Cache, order_key};
    use storefront_orders::emit::outbound_channel;
    use storefront_orders::events::{OutboundEvent, Topic};
    use storefront_orders::model::{NewOrder, NewOrderLine, OrderStatus, OrderUpdate, PaymentStatus};
    use storefront_orders::store::{OrderSort, OrderSortField};
    use storefront_orders::OrderEngine;

    use crate::cache::InMemoryCache;
    use crate::store::{InMemoryOrderStore, InMemoryUserDirectory};

    struct Harness {
        engine: OrderEngine,
        store: Arc<InMemoryOrderStore>,
        users: Arc<InMemoryUserDirectory>,
        cache: Arc<InMemoryCache>,
        events: Receiver<OutboundEvent>,
    }

    fn setup() -> Harness {
        storefront_observability::init();
        let store = Arc::new(InMemoryOrderStore::new());
        let users = Arc::new(InMemoryUserDirectory::new());
        let cache = Arc::new(InMemoryCache::new());
        let (outbound, events) = outbound_channel();
        let engine = OrderEngine::new(
            store.clone(),
            users.clone(),
            cache.clone(),
            outbound,
        );
        Harness {
            engine,
            store,
            users,
            cache,
            events,
        }
    }

    fn seed_product(store: &InMemoryOrderStore, sku: &str, price_cents: i64, stock: u32) -> ProductId {
        let product = NewProduct {
            name: format!("Product {sku}"),
            description: None,
            price: Decimal::new(price_cents, 2),
            stock,
            category: None,
            brand: None,
            image_url: None,
            sku: sku.to_string(),
        }
        .into_product(ProductId::new(), Utc::now())
        .unwrap();
        let id = product.id;
        store.seed_product(product).unwrap();
        id
    }

    fn seed_user(users: &InMemoryUserDirectory) -> UserId {
        let id = UserId::new();
        users.add(id);
        id
    }

    fn new_order(user: UserId, lines: Vec<NewOrderLine>) -> NewOrder {
        NewOrder {
            user_id: user,
            lines,
            shipping_address: "1 Main St".to_string(),
            billing_address: None,
            payment_method: Some("card".to_string()),
            notes: None,
        }
    }

    fn line(product: ProductId, quantity: u32) -> NewOrderLine {
        NewOrderLine {
            product_id: product,
            quantity,
        }
    }

    fn drain(events: &Receiver<OutboundEvent>) -> Vec<OutboundEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn stock_of(store: &InMemoryOrderStore, id: ProductId) -> u32 {
        store.product(id).unwrap().unwrap().stock
    }

    #[test]
    fn create_order_snapshots_prices_and_deducts_stock() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 10);

        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 3)]))
            .unwrap();

        // 9.99 * 3 = 29.97, exactly.
        assert_eq!(order.total_amount, Decimal::new(2997, 2));
        assert_eq!(order.total_items, 3);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, None);
        assert!(order.order_number.as_str().starts_with("ORD-"));
        assert_eq!(stock_of(&h.store, product), 7);

        let events = drain(&h.events);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].topic, Topic::Orders);
        assert_eq!(events[0].partition_key, order.id.to_string());
        assert_eq!(events[1].topic, Topic::Inventory);
        assert_eq!(events[1].partition_key, product.to_string());
        assert_eq!(events[1].payload["reason"], "ORDER_CREATED");
        assert_eq!(events[1].payload["stock_before"], 10);
        assert_eq!(events[1].payload["stock_after"], 7);
        assert_eq!(events[1].payload["quantity_changed"], -3);
    }

    #[test]
    fn create_order_is_atomic_across_lines() {
        let h = setup();
        let user = seed_user(&h.users);
        let plenty = seed_product(&h.store, "SKU-1", 500, 100);
        let scarce = seed_product(&h.store, "SKU-2", 500, 1);

        let err = h
            .engine
            .create_order(new_order(user, vec![line(plenty, 5), line(scarce, 2)]))
            .unwrap_err();

        assert!(matches!(err, DomainError::InsufficientStock { requested: 2, available: 1, .. }));
        // First line's deduction must not have leaked.
        assert_eq!(stock_of(&h.store, plenty), 100);
        assert_eq!(stock_of(&h.store, scarce), 1);
        assert!(drain(&h.events).is_empty());
    }

    #[test]
    fn create_order_rejects_unknown_user_and_product() {
        let h = setup();
        let product = seed_product(&h.store, "SKU-1", 999, 10);

        let err = h
            .engine
            .create_order(new_order(UserId::new(), vec![line(product, 1)]))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "user", .. }));

        let user = seed_user(&h.users);
        let err = h
            .engine
            .create_order(new_order(user, vec![line(ProductId::new(), 1)]))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "product", .. }));
        assert!(drain(&h.events).is_empty());
    }

    #[test]
    fn create_order_validates_lines_before_touching_anything() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 10);

        let err = h.engine.create_order(new_order(user, vec![])).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = h
            .engine
            .create_order(new_order(user, vec![line(product, 0)]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(stock_of(&h.store, product), 10);
    }

    #[test]
    fn cancel_restores_stock_and_marks_refunded() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 10);
        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 4)]))
            .unwrap();
        drain(&h.events);

        let cancelled = h.engine.cancel_order(order.id).unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.payment_status, Some(PaymentStatus::Refunded));
        assert_eq!(stock_of(&h.store, product), 10);

        let events = drain(&h.events);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].topic, Topic::OrderStatus);
        assert_eq!(events[0].payload["old_status"], "PENDING");
        assert_eq!(events[0].payload["new_status"], "CANCELLED");
        assert_eq!(events[1].topic, Topic::Inventory);
        assert_eq!(events[1].payload["reason"], "ORDER_CANCELLED");
        assert_eq!(events[1].payload["quantity_changed"], 4);
    }

    #[test]
    fn cancel_is_idempotent() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 10);
        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 4)]))
            .unwrap();

        h.engine.cancel_order(order.id).unwrap();
        drain(&h.events);

        let again = h.engine.cancel_order(order.id).unwrap();

        assert_eq!(again.status, OrderStatus::Cancelled);
        // Second cancel: no stock mutation, no events.
        assert_eq!(stock_of(&h.store, product), 10);
        assert!(drain(&h.events).is_empty());
    }

    #[test]
    fn status_transition_to_cancelled_behaves_like_cancel() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 10);
        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 2)]))
            .unwrap();
        drain(&h.events);

        let updated = h
            .engine
            .update_order_status(order.id, OrderStatus::Cancelled)
            .unwrap();

        assert_eq!(updated.payment_status, Some(PaymentStatus::Refunded));
        assert_eq!(stock_of(&h.store, product), 10);
        let events = drain(&h.events);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].topic, Topic::OrderStatus);
        assert_eq!(events[1].payload["reason"], "ORDER_CANCELLED");
    }

    #[test]
    fn status_cancel_on_cancelled_order_is_inert() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 10);
        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 4)]))
            .unwrap();
        h.engine
            .update_order_status(order.id, OrderStatus::Cancelled)
            .unwrap();
        assert_eq!(stock_of(&h.store, product), 10);
        drain(&h.events);

        let again = h
            .engine
            .update_order_status(order.id, OrderStatus::Cancelled)
            .unwrap();

        // No second restoration: stock unchanged, no inventory event.
        assert_eq!(again.status, OrderStatus::Cancelled);
        assert_eq!(stock_of(&h.store, product), 10);
        let events = drain(&h.events);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, Topic::OrderStatus);
        assert_eq!(events[0].payload["old_status"], "CANCELLED");
        assert_eq!(events[0].payload["new_status"], "CANCELLED");
    }

    #[test]
    fn status_transitions_always_emit_events() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 10);
        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 2)]))
            .unwrap();
        drain(&h.events);

        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            let updated = h.engine.update_order_status(order.id, status).unwrap();
            assert_eq!(updated.status, status);
        }

        let events = drain(&h.events);
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.topic == Topic::OrderStatus));
        assert_eq!(events[0].payload["old_status"], "PENDING");
        assert_eq!(events[0].payload["new_status"], "CONFIRMED");
        assert_eq!(events[3].payload["old_status"], "SHIPPED");
        assert_eq!(events[3].payload["new_status"], "DELIVERED");
        // No stock was touched along the way.
        assert_eq!(stock_of(&h.store, product), 8);
    }

    #[test]
    fn update_order_round_trip_is_stock_neutral() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 10);
        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 3)]))
            .unwrap();
        drain(&h.events);

        // Same line set again: restore 3, deduct 3.
        let updated = h
            .engine
            .update_order(
                order.id,
                OrderUpdate {
                    lines: vec![line(product, 3)],
                    shipping_address: None,
                    billing_address: None,
                    payment_method: None,
                    notes: None,
                },
            )
            .unwrap();

        assert_eq!(stock_of(&h.store, product), 7);
        assert_eq!(updated.total_amount, order.total_amount);

        let events = drain(&h.events);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload["reason"], "ORDER_UPDATED_ITEM_REMOVED");
        assert_eq!(events[0].payload["quantity_changed"], 3);
        assert_eq!(events[1].payload["reason"], "ORDER_UPDATED");
        assert_eq!(events[1].payload["quantity_changed"], -3);
    }

    #[test]
    fn update_order_can_grow_within_restored_stock() {
        let h = setup();
        let user = seed_user(&h.users);
        // Stock 5, order 4: only 1 left, but updating to 5 works because the
        // old lines are restored first.
        let product = seed_product(&h.store, "SKU-1", 1000, 5);
        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 4)]))
            .unwrap();
        assert_eq!(stock_of(&h.store, product), 1);
        drain(&h.events);

        let updated = h
            .engine
            .update_order(
                order.id,
                OrderUpdate {
                    lines: vec![line(product, 5)],
                    shipping_address: None,
                    billing_address: None,
                    payment_method: None,
                    notes: None,
                },
            )
            .unwrap();

        assert_eq!(updated.total_items, 5);
        assert_eq!(stock_of(&h.store, product), 0);
    }

    #[test]
    fn update_order_failure_rolls_back_restores() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 1000, 5);
        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 4)]))
            .unwrap();
        drain(&h.events);

        // 4 restored + 1 free = 5 available; 6 must fail and undo the restore.
        let err = h
            .engine
            .update_order(
                order.id,
                OrderUpdate {
                    lines: vec![line(product, 6)],
                    shipping_address: None,
                    billing_address: None,
                    payment_method: None,
                    notes: None,
                },
            )
            .unwrap_err();

        assert!(matches!(err, DomainError::InsufficientStock { requested: 6, available: 5, .. }));
        assert_eq!(stock_of(&h.store, product), 1);
        let unchanged = h.engine.get_order(order.id).unwrap();
        assert_eq!(unchanged.total_items, 4);
        assert!(drain(&h.events).is_empty());
    }

    #[test]
    fn update_order_overrides_only_provided_fields() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 10);
        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 1)]))
            .unwrap();
        assert_eq!(order.payment_method.as_deref(), Some("card"));
        drain(&h.events);

        let updated = h
            .engine
            .update_order(
                order.id,
                OrderUpdate {
                    lines: vec![line(product, 1)],
                    shipping_address: Some("2 Side St".to_string()),
                    billing_address: None,
                    payment_method: Some("paypal".to_string()),
                    notes: Some("leave at door".to_string()),
                },
            )
            .unwrap();

        assert_eq!(updated.shipping_address, "2 Side St");
        assert_eq!(updated.payment_method.as_deref(), Some("paypal"));
        assert_eq!(updated.notes.as_deref(), Some("leave at door"));
        // Absent fields keep their stored values.
        assert_eq!(updated.billing_address, order.billing_address);
    }

    #[test]
    fn update_order_rejects_cancelled_orders() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 10);
        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 1)]))
            .unwrap();
        h.engine.cancel_order(order.id).unwrap();
        drain(&h.events);

        let err = h
            .engine
            .update_order(
                order.id,
                OrderUpdate {
                    lines: vec![line(product, 2)],
                    shipping_address: None,
                    billing_address: None,
                    payment_method: None,
                    notes: None,
                },
            )
            .unwrap_err();

        assert!(matches!(err, DomainError::InvalidState(_)));
        assert_eq!(stock_of(&h.store, product), 10);
        assert!(drain(&h.events).is_empty());
    }

    #[test]
    fn delete_restores_stock_once() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 10);

        // Delete of a live order restores stock, emits nothing.
        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 3)]))
            .unwrap();
        drain(&h.events);
        h.engine.delete_order(order.id).unwrap();
        assert_eq!(stock_of(&h.store, product), 10);
        assert!(drain(&h.events).is_empty());
        assert!(matches!(
            h.engine.get_order(order.id).unwrap_err(),
            DomainError::NotFound { .. }
        ));

        // Delete of a cancelled order must not restore again.
        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 3)]))
            .unwrap();
        h.engine.cancel_order(order.id).unwrap();
        assert_eq!(stock_of(&h.store, product), 10);
        h.engine.delete_order(order.id).unwrap();
        assert_eq!(stock_of(&h.store, product), 10);
    }

    #[test]
    fn concurrent_creates_never_oversell() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 1);

        let engine_a = h.engine.clone();
        let engine_b = h.engine.clone();
        let a = std::thread::spawn(move || engine_a.create_order(new_order(user, vec![line(product, 1)])));
        let b = std::thread::spawn(move || engine_b.create_order(new_order(user, vec![line(product, 1)])));
        let results = [a.join().unwrap(), b.join().unwrap()];

        let oks = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(oks, 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(DomainError::InsufficientStock { available: 0, .. })
        )));
        assert_eq!(stock_of(&h.store, product), 0);
    }

    #[test]
    fn get_order_reads_through_the_cache() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 10);
        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 1)]))
            .unwrap();

        assert!(h.cache.get(&order_key(order.id)).is_none());
        let fetched = h.engine.get_order(order.id).unwrap();
        assert_eq!(fetched, h.engine.get_order(order.id).unwrap());
        assert!(h.cache.get(&order_key(order.id)).is_some());

        // Mutation evicts the cached entry.
        h.engine
            .update_order_status(order.id, OrderStatus::Confirmed)
            .unwrap();
        assert!(h.cache.get(&order_key(order.id)).is_none());
    }

    #[test]
    fn cache_failure_degrades_to_store_reads() {
        /// A cache whose backend is permanently down.
        struct DownCache;
        impl Cache for DownCache {
            fn get(&self, _key: &str) -> Option<JsonValue> {
                None
            }
            fn put(&self, _key: &str, _value: JsonValue, _ttl: Duration) {}
            fn evict(&self, _key: &str) {}
            fn evict_namespace(&self, _prefix: &str) {}
        }

        let store = Arc::new(InMemoryOrderStore::new());
        let users = Arc::new(InMemoryUserDirectory::new());
        let (outbound, _events) = outbound_channel();
        let engine = OrderEngine::new(store.clone(), users.clone(), Arc::new(DownCache), outbound);

        let user = seed_user(&users);
        let product = seed_product(&store, "SKU-1", 999, 10);
        let order = engine
            .create_order(new_order(user, vec![line(product, 2)]))
            .unwrap();

        assert_eq!(engine.get_order(order.id).unwrap().id, order.id);
        assert_eq!(engine.orders_by_owner(user).unwrap().len(), 1);
    }

    #[test]
    fn dropped_event_channel_never_fails_operations() {
        let h = setup();
        drop(h.events);

        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 10);
        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 2)]))
            .unwrap();
        h.engine.cancel_order(order.id).unwrap();
        assert_eq!(stock_of(&h.store, product), 10);
    }

    #[test]
    fn owner_list_is_cached_and_evicted_on_writes() {
        let h = setup();
        let user = seed_user(&h.users);
        let other = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 100);

        h.engine
            .create_order(new_order(user, vec![line(product, 1)]))
            .unwrap();
        h.engine
            .create_order(new_order(other, vec![line(product, 1)]))
            .unwrap();

        let mine = h.engine.orders_by_owner(user).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].user_id, user);

        // A second order by the same owner evicts the cached list.
        h.engine
            .create_order(new_order(user, vec![line(product, 1)]))
            .unwrap();
        assert_eq!(h.engine.orders_by_owner(user).unwrap().len(), 2);
    }

    #[test]
    fn list_reads_paginate_and_sort() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 100, 1000);

        for quantity in [1u32, 3, 2] {
            h.engine
                .create_order(new_order(user, vec![line(product, quantity)]))
                .unwrap();
        }

        let sort = OrderSort {
            field: OrderSortField::Total,
            direction: SortDirection::Asc,
        };
        let first = h.engine.all_orders(PageRequest::new(0, 2), sort).unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.items.len(), 2);
        assert!(first.has_more());
        assert!(first.items[0].total_amount <= first.items[1].total_amount);

        let second = h.engine.all_orders(PageRequest::new(1, 2), sort).unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(!second.has_more());
        assert_eq!(second.items[0].total_amount, Decimal::new(300, 2));

        let pending = h
            .engine
            .orders_by_status(OrderStatus::Pending, PageRequest::new(0, 10), OrderSort::default())
            .unwrap();
        assert_eq!(pending.total, 3);
        let cancelled = h
            .engine
            .orders_by_status(OrderStatus::Cancelled, PageRequest::new(0, 10), OrderSort::default())
            .unwrap();
        assert_eq!(cancelled.total, 0);
    }

    #[test]
    fn duplicate_product_lines_each_deduct() {
        let h = setup();
        let user = seed_user(&h.users);
        let product = seed_product(&h.store, "SKU-1", 999, 10);

        let order = h
            .engine
            .create_order(new_order(user, vec![line(product, 2), line(product, 3)]))
            .unwrap();

        assert_eq!(order.total_items, 5);
        assert_eq!(order.lines.len(), 2);
        assert_eq!(stock_of(&h.store, product), 5);
    }
}
