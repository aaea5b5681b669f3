use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use storefront_core::money::ensure_positive_price;
use storefront_core::{DomainError, DomainResult, ProductId};

/// A catalog product as seen by the order engine.
///
/// The engine treats everything except `stock` as read-only; `name` and
/// `price` are snapshotted onto order lines at order time so later catalog
/// edits never rewrite history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    /// Unit price, strictly positive, 2 decimal places.
    pub price: Decimal,
    /// On-hand stock. Never negative by construction.
    pub stock: u32,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub image_url: Option<String>,
    /// Unique per catalog; enforced by the store.
    pub sku: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether `quantity` units can be deducted right now.
    pub fn has_stock(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }
}

/// Input for seeding a product into a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: u32,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub image_url: Option<String>,
    pub sku: String,
}

impl NewProduct {
    /// Validate and materialize a product record.
    pub fn into_product(self, id: ProductId, now: DateTime<Utc>) -> DomainResult<Product> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if self.sku.trim().is_empty() {
            return Err(DomainError::validation("SKU cannot be empty"));
        }
        let price = ensure_positive_price(self.price)?;

        Ok(Product {
            id,
            name: self.name,
            description: self.description,
            price,
            stock: self.stock,
            category: self.category,
            brand: self.brand,
            image_url: self.image_url,
            sku: self.sku,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }
}
