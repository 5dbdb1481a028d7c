//! Records persisted by the durable store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CustomerId, LineItemId, Money, OrderId, OrderStatus, ProductId};

/// A catalog product with its current stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub description: String,
    /// Price of one unit, never negative.
    pub unit_price: Money,
    /// Units available for reservation.
    pub stock_quantity: u32,
}

impl Product {
    /// Creates a new product with a generated id.
    pub fn new(description: impl Into<String>, unit_price: Money, stock_quantity: u32) -> Self {
        Self {
            id: ProductId::new(),
            description: description.into(),
            unit_price,
            stock_quantity,
        }
    }
}

/// A customer profile. Read-only from the order core's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
}

impl Customer {
    /// Creates a new customer with a generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CustomerId::new(),
            name: name.into(),
        }
    }
}

/// The order header row. Line items are stored separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub total: Money,
}

/// One product/quantity pairing within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Always greater than zero.
    pub quantity: u32,
    /// Product unit price captured when the stock was reserved.
    pub unit_price: Money,
}

impl LineItem {
    /// Returns `quantity * unit_price`, or `None` on overflow.
    pub fn subtotal(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}
