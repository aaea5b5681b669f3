//! Stock mutations inside a unit of work.
//!
//! Both directions run against a row already locked by
//! `StoreTx::product_for_update`, so the check-then-write below is safe under
//! concurrency: stock can never go negative and never drifts.

use storefront_catalog::Product;
use storefront_core::{DomainError, DomainResult, ProductId};
use tracing::warn;

use crate::store::StoreTx;

/// A committed-to-be stock mutation, recorded for post-commit event emission.
#[derive(Debug, Clone, PartialEq)]
pub struct StockChange {
    pub product_id: ProductId,
    pub product_name: String,
    pub before: u32,
    pub after: u32,
}

impl StockChange {
    /// Signed delta: negative for deductions, positive for restores.
    pub fn delta(&self) -> i64 {
        i64::from(self.after) - i64::from(self.before)
    }
}

/// Deduct `quantity` units, failing before any write when unavailable.
///
/// Returns the product snapshot (as read under the lock, pre-mutation) so
/// callers can freeze name/price onto order lines.
pub fn deduct_stock(
    tx: &mut dyn StoreTx,
    product_id: ProductId,
    quantity: u32,
) -> DomainResult<(Product, StockChange)> {
    let product = tx
        .product_for_update(product_id)?
        .ok_or_else(|| DomainError::not_found("product", product_id))?;

    if product.stock < quantity {
        return Err(DomainError::InsufficientStock {
            product_id,
            requested: quantity,
            available: product.stock,
        });
    }

    let after = product.stock - quantity;
    tx.set_product_stock(product_id, after)?;

    let change = StockChange {
        product_id,
        product_name: product.name.clone(),
        before: product.stock,
        after,
    };
    Ok((product, change))
}

/// Restore `quantity` units. A product deleted since the order was placed is
/// skipped (`None`) rather than failing the cancellation.
pub fn restore_stock(
    tx: &mut dyn StoreTx,
    product_id: ProductId,
    quantity: u32,
) -> DomainResult<Option<StockChange>> {
    let Some(product) = tx.product_for_update(product_id)? else {
        warn!(product_id = %product_id, quantity, "product gone, skipping stock restore");
        return Ok(None);
    };

    let after = product.stock.saturating_add(quantity);
    tx.set_product_stock(product_id, after)?;

    Ok(Some(StockChange {
        product_id,
        product_name: product.name,
        before: product.stock,
        after,
    }))
}
