//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::id::ProductId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant aborts the enclosing unit of work before (or instead of)
/// any partial write. Side-effect failures (cache, event transport) are
/// deliberately *not* represented here; they are logged and swallowed at
/// the call site.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// A request failed validation (empty line list, non-positive quantity,
    /// missing required field).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced entity (order, product, user) does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Requested quantity exceeds available stock.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The order is in a state that forbids the mutation (e.g. cancelled).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A uniqueness constraint was violated (duplicate SKU / order number).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A monetary value was out of range for the operation.
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// The backing store failed. The transaction did not commit.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}
