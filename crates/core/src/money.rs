//! Monetary arithmetic helpers.
//!
//! All money in the domain is `rust_decimal::Decimal` (fixed-point); totals
//! are exact sums of line subtotals with no floating rounding drift.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{DomainError, DomainResult};

/// Monetary values carry 2 decimal places, rounded half-up.
pub const MONEY_SCALE: u32 = 2;

/// Round a monetary value to the canonical scale.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Subtotal for an order line: unit price × quantity.
pub fn line_subtotal(unit_price: Decimal, quantity: u32) -> Decimal {
    round_money(unit_price * Decimal::from(quantity))
}

/// Validate a catalog unit price: strictly positive.
pub fn ensure_positive_price(price: Decimal) -> DomainResult<Decimal> {
    if price <= Decimal::ZERO {
        return Err(DomainError::InvalidAmount(price));
    }
    Ok(round_money(price))
}
