//! Storage contracts for the order engine.
//!
//! A store hands out a [`StoreTx`] unit of work; every mutating engine
//! operation runs inside exactly one unit of work and commits it once all
//! checks pass. Dropping an uncommitted unit of work rolls it back.

use std::sync::Arc;

use thiserror::Error;

use storefront_catalog::Product;
use storefront_core::{DomainError, OrderId, Page, PageRequest, ProductId, SortDirection, UserId};

use crate::model::{Order, OrderStatus};

/// Infrastructure-level store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed (connection, query, poisoned lock).
    #[error("store backend: {0}")]
    Backend(String),

    /// A uniqueness constraint was violated.
    #[error("store conflict: {0}")]
    Conflict(String),

    /// A stored value could not be decoded.
    #[error("store serialization: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => DomainError::Conflict(msg),
            other => DomainError::Storage(other.to_string()),
        }
    }
}

/// Which orders a list read returns.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OrderFilter {
    All,
    Owner(UserId),
    Status(OrderStatus),
}

/// Sortable columns for list reads.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OrderSortField {
    CreatedAt,
    UpdatedAt,
    Total,
    Status,
}

impl OrderSortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSortField::CreatedAt => "created_at",
            OrderSortField::UpdatedAt => "updated_at",
            OrderSortField::Total => "total_amount",
            OrderSortField::Status => "status",
        }
    }
}

/// Sort spec for list reads. Defaults to newest first.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OrderSort {
    pub field: OrderSortField,
    pub direction: SortDirection,
}

impl Default for OrderSort {
    fn default() -> Self {
        Self {
            field: OrderSortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

/// Durable order + stock storage.
pub trait OrderStore: Send + Sync {
    /// Open a unit of work. Writes become visible only on `commit`.
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>, StoreError>;

    fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    fn list_orders(
        &self,
        filter: OrderFilter,
        page: PageRequest,
        sort: OrderSort,
    ) -> Result<Page<Order>, StoreError>;
}

/// A single all-or-nothing unit of work.
///
/// `product_for_update` takes the row lock (or equivalent) that makes the
/// subsequent check-then-write on stock safe against concurrent writers.
pub trait StoreTx {
    fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    fn set_product_stock(&mut self, id: ProductId, stock: u32) -> Result<(), StoreError>;

    fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    fn update_order(&mut self, order: &Order) -> Result<(), StoreError>;

    fn delete_order(&mut self, id: OrderId) -> Result<(), StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Lookup collaborator for order owners.
pub trait UserDirectory: Send + Sync {
    fn exists(&self, user: UserId) -> Result<bool, StoreError>;
}

impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>, StoreError> {
        (**self).begin()
    }

    fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).find_order(id)
    }

    fn list_orders(
        &self,
        filter: OrderFilter,
        page: PageRequest,
        sort: OrderSort,
    ) -> Result<Page<Order>, StoreError> {
        (**self).list_orders(filter, page, sort)
    }
}

impl<U> UserDirectory for Arc<U>
where
    U: UserDirectory + ?Sized,
{
    fn exists(&self, user: UserId) -> Result<bool, StoreError> {
        (**self).exists(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_domain_conflict() {
        let err: DomainError = StoreError::conflict("duplicate order_number").into();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn backend_maps_to_domain_storage() {
        let err: DomainError = StoreError::backend("connection reset").into();
        assert!(matches!(err, DomainError::Storage(_)));
    }
}
