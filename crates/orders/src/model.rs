//! Order aggregate model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use storefront_catalog::Product;
use storefront_core::money::line_subtotal;
use storefront_core::{DomainError, DomainResult, OrderId, ProductId, UserId};

/// Order lifecycle status.
///
/// Serialized in SCREAMING_SNAKE_CASE to match the wire values consumers of
/// the event topics already expect.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "SHIPPED" => Ok(OrderStatus::Shipped),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown order status: {other}"))),
        }
    }
}

/// Payment bookkeeping on the order row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl core::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAID" => Ok(PaymentStatus::Paid),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            other => Err(DomainError::validation(format!("unknown payment status: {other}"))),
        }
    }
}

/// Human-readable unique order number, derived from the order id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn derive(id: OrderId) -> Self {
        Self(format!("ORD-{}", id.as_uuid().simple()).to_uppercase())
    }

    pub fn from_string(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A line on an order.
///
/// `product_name` and `unit_price` are frozen snapshots taken at order time;
/// later catalog edits never change what the buyer agreed to. Lines are
/// replaced wholesale on update, never mutated individually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub subtotal: Decimal,
}

impl OrderLine {
    /// Snapshot a catalog product into a line.
    pub fn snapshot(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            product_name: product.name.clone(),
            unit_price: product.price,
            quantity,
            subtotal: line_subtotal(product.price, quantity),
        }
    }
}

/// Sum of line subtotals.
pub fn order_total(lines: &[OrderLine]) -> Decimal {
    lines.iter().map(|l| l.subtotal).sum()
}

/// Sum of line quantities.
pub fn order_item_count(lines: &[OrderLine]) -> u32 {
    lines.iter().map(|l| l.quantity).sum()
}

/// The order aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub status: OrderStatus,
    /// Always equals the sum of line subtotals.
    pub total_amount: Decimal,
    /// Always equals the sum of line quantities.
    pub total_items: u32,
    pub shipping_address: String,
    pub billing_address: Option<String>,
    pub payment_method: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub notes: Option<String>,
    pub lines: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_cancelled(&self) -> bool {
        self.status == OrderStatus::Cancelled
    }

    /// Replace the line set and recompute the derived totals.
    pub fn replace_lines(&mut self, lines: Vec<OrderLine>, now: DateTime<Utc>) {
        self.total_amount = order_total(&lines);
        self.total_items = order_item_count(&lines);
        self.lines = lines;
        self.updated_at = now;
    }
}

/// A requested line: which product, how many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Input for `OrderEngine::create_order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub lines: Vec<NewOrderLine>,
    pub shipping_address: String,
    pub billing_address: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

/// Input for `OrderEngine::update_order`. The line set is replaced wholesale;
/// `None` address/payment/notes fields leave the stored values untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub lines: Vec<NewOrderLine>,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

/// Shared validation for requested line sets.
pub(crate) fn validate_lines(lines: &[NewOrderLine]) -> DomainResult<()> {
    if lines.is_empty() {
        return Err(DomainError::validation("order must contain at least one line"));
    }
    for line in lines {
        if line.quantity == 0 {
            return Err(DomainError::validation(format!(
                "quantity must be positive for product {}",
                line.product_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn product(price_cents: i64, stock: u32) -> Product {
        Product {
            id: ProductId::new(),
            name: "Widget".to_string(),
            description: None,
            price: Decimal::new(price_cents, 2),
            stock,
            category: None,
            brand: None,
            image_url: None,
            sku: "SKU-001".to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn snapshot_freezes_name_and_price() {
        let mut p = product(999, 10);
        let line = OrderLine::snapshot(&p, 3);

        p.name = "Renamed".to_string();
        p.price = Decimal::new(1999, 2);

        assert_eq!(line.product_name, "Widget");
        assert_eq!(line.unit_price, Decimal::new(999, 2));
        assert_eq!(line.subtotal, Decimal::new(2997, 2));
    }

    #[test]
    fn order_number_is_deterministic_per_id() {
        let id = OrderId::new();
        assert_eq!(OrderNumber::derive(id), OrderNumber::derive(id));
        assert!(OrderNumber::derive(id).as_str().starts_with("ORD-"));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            let parsed: OrderStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&OrderStatus::Cancelled).unwrap();
        assert_eq!(json, "\"CANCELLED\"");
    }

    #[test]
    fn validate_lines_rejects_empty_set_and_zero_quantity() {
        assert!(validate_lines(&[]).is_err());
        let lines = vec![NewOrderLine {
            product_id: ProductId::new(),
            quantity: 0,
        }];
        assert!(validate_lines(&lines).is_err());
        let lines = vec![NewOrderLine {
            product_id: ProductId::new(),
            quantity: 1,
        }];
        assert!(validate_lines(&lines).is_ok());
    }

    proptest! {
        /// Totals derived from any line set satisfy the aggregate invariants:
        /// total == Σ subtotal and total_items == Σ quantity.
        #[test]
        fn totals_match_line_sums(
            specs in proptest::collection::vec((1i64..100_000, 1u32..50), 1..8)
        ) {
            let lines: Vec<OrderLine> = specs
                .iter()
                .map(|&(cents, qty)| OrderLine::snapshot(&product(cents, 1000), qty))
                .collect();

            let expected_total: Decimal = lines.iter().map(|l| l.subtotal).sum();
            let expected_items: u32 = specs.iter().map(|&(_, q)| q).sum();

            prop_assert_eq!(order_total(&lines), expected_total);
            prop_assert_eq!(order_item_count(&lines), expected_items);
        }
    }
}
