//! In-memory store for tests and development.
//!
//! One mutex guards the whole state, and a unit of work holds that guard for
//! its entire lifetime. This makes every unit of work fully serialized, which
//! is exactly the isolation the engine's check-then-write on stock needs.
//! Writes go to a staged copy and only land on commit, so a dropped unit of
//! work rolls back for free.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use storefront_catalog::Product;
use storefront_core::{OrderId, Page, PageRequest, ProductId, SortDirection, UserId};
use storefront_orders::model::Order;
use storefront_orders::store::{
    OrderFilter, OrderSort, OrderSortField, OrderStore, StoreError, StoreTx, UserDirectory,
};

#[derive(Debug, Default, Clone)]
struct State {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
}

/// In-memory order + product store.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    state: Mutex<State>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a product. SKU uniqueness is enforced like a database constraint.
    pub fn seed_product(&self, product: Product) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state
            .products
            .values()
            .any(|p| p.sku == product.sku && p.id != product.id)
        {
            return Err(StoreError::conflict(format!("duplicate sku: {}", product.sku)));
        }
        state.products.insert(product.id, product);
        Ok(())
    }

    /// Read a product outside any unit of work (test assertions).
    pub fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.lock()?.products.get(&id).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::backend("store lock poisoned"))
    }
}

impl OrderStore for InMemoryOrderStore {
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>, StoreError> {
        let guard = self.lock()?;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTx { guard, staged }))
    }

    fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.lock()?.orders.get(&id).cloned())
    }

    fn list_orders(
        &self,
        filter: OrderFilter,
        page: PageRequest,
        sort: OrderSort,
    ) -> Result<Page<Order>, StoreError> {
        let state = self.lock()?;
        let mut matched: Vec<Order> = state
            .orders
            .values()
            .filter(|o| match filter {
                OrderFilter::All => true,
                OrderFilter::Owner(user) => o.user_id == user,
                OrderFilter::Status(status) => o.status == status,
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let ord = match sort.field {
                OrderSortField::CreatedAt => a.created_at.cmp(&b.created_at),
                OrderSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                OrderSortField::Total => a.total_amount.cmp(&b.total_amount),
                OrderSortField::Status => a.status.as_str().cmp(b.status.as_str()),
            };
            match sort.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .collect();
        Ok(Page::new(items, page, total))
    }
}

/// Unit of work over a staged copy of the state.
struct InMemoryTx<'a> {
    guard: MutexGuard<'a, State>,
    staged: State,
}

impl StoreTx for InMemoryTx<'_> {
    fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.staged.products.get(&id).cloned())
    }

    fn set_product_stock(&mut self, id: ProductId, stock: u32) -> Result<(), StoreError> {
        match self.staged.products.get_mut(&id) {
            Some(product) => {
                product.stock = stock;
                product.updated_at = chrono::Utc::now();
                Ok(())
            }
            None => Err(StoreError::backend(format!("no such product: {id}"))),
        }
    }

    fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.staged.orders.get(&id).cloned())
    }

    fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self.staged.orders.contains_key(&order.id) {
            return Err(StoreError::conflict(format!("duplicate order id: {}", order.id)));
        }
        if self
            .staged
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(StoreError::conflict(format!(
                "duplicate order number: {}",
                order.order_number
            )));
        }
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if !self.staged.orders.contains_key(&order.id) {
            return Err(StoreError::backend(format!("no such order: {}", order.id)));
        }
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    fn delete_order(&mut self, id: OrderId) -> Result<(), StoreError> {
        self.staged.orders.remove(&id);
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        *self.guard = self.staged;
        Ok(())
    }
}

/// In-memory owner lookup.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<HashSet<UserId>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, user: UserId) {
        if let Ok(mut users) = self.users.lock() {
            users.insert(user);
        }
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn exists(&self, user: UserId) -> Result<bool, StoreError> {
        Ok(self
            .users
            .lock()
            .map_err(|_| StoreError::backend("user directory lock poisoned"))?
            .contains(&user))
    }
}
