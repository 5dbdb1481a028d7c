//! The order aggregate as seen by callers.

use chrono::{DateTime, Utc};
use common::{
    Customer, CustomerId, LineItem, Money, OrderId, OrderRecord, OrderStatus, Product, ProductId,
};
use serde::{Deserialize, Serialize};

/// One requested product/quantity pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl LineItemRequest {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// An order together with the line items it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub total: Money,
    pub items: Vec<LineItem>,
}

impl Order {
    /// Assembles an order from its stored header and items.
    pub fn from_parts(record: OrderRecord, items: Vec<LineItem>) -> Self {
        Self {
            id: record.id,
            customer_id: record.customer_id,
            status: record.status,
            created_at: record.created_at,
            total: record.total,
            items,
        }
    }

    /// Returns the header row for this order.
    pub fn record(&self) -> OrderRecord {
        OrderRecord {
            id: self.id,
            customer_id: self.customer_id,
            status: self.status,
            created_at: self.created_at,
            total: self.total,
        }
    }

    /// Recomputes the total from the line items.
    ///
    /// Equal to `total` for every committed order.
    pub fn items_total(&self) -> Option<Money> {
        self.items.iter().try_fold(Money::zero(), |acc, item| {
            item.subtotal().and_then(|subtotal| acc.checked_add(subtotal))
        })
    }

    /// The line items expressed as reservation requests.
    pub fn requests(&self) -> Vec<LineItemRequest> {
        self.items
            .iter()
            .map(|item| LineItemRequest::new(item.product_id, item.quantity))
            .collect()
    }
}

/// The fields of an order a caller may change.
///
/// Anything not listed here (status, total, creation date) is owned by the
/// order service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    /// Reassigns the order to another customer.
    pub customer_id: Option<CustomerId>,
    /// Replaces every line item. `None` or an empty list leaves the items
    /// and total untouched.
    pub items: Option<Vec<LineItemRequest>>,
}

impl OrderPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn items(mut self, items: Vec<LineItemRequest>) -> Self {
        self.items = Some(items);
        self
    }
}

/// A line item with its product resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItemDetails {
    pub item: LineItem,
    pub product: Product,
}

/// An order with its customer and products resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub customer: Customer,
    pub items: Vec<LineItemDetails>,
}
