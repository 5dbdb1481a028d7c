//! Domain error types.

use common::{CustomerId, OrderId, OrderStatus, ProductId};
use store::StoreError;
use thiserror::Error;

/// Business rule violations.
///
/// Each of these rejects the request and rolls back the enclosing
/// transaction. They are never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The referenced customer does not exist.
    #[error("Invalid customer: {0}")]
    InvalidCustomer(CustomerId),

    /// The referenced product does not exist.
    #[error("Invalid product: {0}")]
    InvalidProduct(ProductId),

    /// The requested quantity exceeds the available stock.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The order was submitted without line items.
    #[error("Order has no line items")]
    EmptyOrder,

    /// The targeted order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A line item asked for zero units.
    #[error("Invalid quantity {quantity} for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// The transition policy forbids moving between these statuses.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// The items of a cancelled order cannot be replaced.
    #[error("Order {0} is cancelled; its items cannot be replaced")]
    OrderCancelled(OrderId),

    /// The order total does not fit in the money representation.
    #[error("Order total overflows")]
    TotalOverflow,
}

impl OrderError {
    /// Short, stable label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            OrderError::InvalidCustomer(_) => "invalid_customer",
            OrderError::InvalidProduct(_) => "invalid_product",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::EmptyOrder => "empty_order",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::InvalidQuantity { .. } => "invalid_quantity",
            OrderError::InvalidStatusTransition { .. } => "invalid_status_transition",
            OrderError::OrderCancelled(_) => "order_cancelled",
            OrderError::TotalOverflow => "total_overflow",
        }
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The request broke a business rule.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DomainError {
    /// Returns true if the failure is an infrastructure hiccup the caller
    /// may retry.
    pub fn is_transient(&self) -> bool {
        match self {
            DomainError::Order(_) => false,
            DomainError::Store(err) => err.is_transient(),
        }
    }

    /// Returns the business error, if this is one.
    pub fn as_order_error(&self) -> Option<&OrderError> {
        match self {
            DomainError::Order(err) => Some(err),
            DomainError::Store(_) => None,
        }
    }
}
