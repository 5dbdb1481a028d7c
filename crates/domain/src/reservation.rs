//! Stock reservation engine.
//!
//! Reserving validates a batch of line-item requests against the catalog
//! and decrements stock; releasing returns it. Neither function is
//! transactional on its own: both write through the caller's
//! [`StoreTransaction`], and a failure part-way through a batch relies on
//! the caller dropping that transaction to undo earlier decrements.
//!
//! Product rows are locked in ascending id order before a batch is
//! processed, so two transactions touching the same products never wait
//! on each other in a cycle.

use std::collections::BTreeSet;

use common::{LineItem, LineItemId, Money, OrderId, Product, ProductId};
use store::{StoreError, StoreTransaction};

use crate::error::{DomainError, OrderError};
use crate::order::LineItemRequest;

/// A product reserved for one line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedItem {
    /// The product as saved after the decrement.
    pub product: Product,
    pub quantity: u32,
}

/// The outcome of a successful reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// One entry per request, in request order.
    pub items: Vec<ReservedItem>,
    /// Exact sum of `quantity * unit_price` over `items`.
    pub total: Money,
}

impl Reservation {
    /// Turns the reservation into line items owned by `order_id`, priced at
    /// the unit price seen while reserving.
    pub fn into_line_items(self, order_id: OrderId) -> (Vec<LineItem>, Money) {
        let items = self
            .items
            .into_iter()
            .map(|reserved| LineItem {
                id: LineItemId::new(),
                order_id,
                product_id: reserved.product.id,
                quantity: reserved.quantity,
                unit_price: reserved.product.unit_price,
            })
            .collect();
        (items, self.total)
    }
}

/// Locks the rows of the given products in ascending id order.
///
/// Duplicates are locked once and unknown ids are skipped; callers report
/// them when they reach the offending request.
pub async fn lock_products<T, I>(tx: &mut T, ids: I) -> Result<(), StoreError>
where
    T: StoreTransaction,
    I: IntoIterator<Item = ProductId>,
{
    let sorted: BTreeSet<ProductId> = ids.into_iter().collect();
    for id in sorted {
        tx.find_product_by_id(id).await?;
    }
    Ok(())
}

/// Reserves stock for every request, in request order.
///
/// Fails with [`OrderError::EmptyOrder`] for an empty batch and with
/// [`OrderError::InvalidQuantity`] before touching any stock if a request
/// asks for zero units. Each product decrement is saved immediately, so a
/// later request for the same product sees the reduced stock.
pub async fn reserve<T: StoreTransaction>(
    tx: &mut T,
    requests: &[LineItemRequest],
) -> Result<Reservation, DomainError> {
    if requests.is_empty() {
        return Err(OrderError::EmptyOrder.into());
    }
    if let Some(bad) = requests.iter().find(|r| r.quantity == 0) {
        return Err(OrderError::InvalidQuantity {
            product_id: bad.product_id,
            quantity: bad.quantity,
        }
        .into());
    }

    lock_products(tx, requests.iter().map(|r| r.product_id)).await?;

    let mut items = Vec::with_capacity(requests.len());
    for request in requests {
        let mut product = tx
            .find_product_by_id(request.product_id)
            .await?
            .ok_or(OrderError::InvalidProduct(request.product_id))?;

        if product.stock_quantity < request.quantity {
            return Err(OrderError::InsufficientStock {
                product_id: product.id,
                requested: request.quantity,
                available: product.stock_quantity,
            }
            .into());
        }

        product.stock_quantity -= request.quantity;
        tx.save_product(&product).await?;

        tracing::debug!(
            product_id = %product.id,
            quantity = request.quantity,
            remaining = product.stock_quantity,
            "stock reserved"
        );
        metrics::counter!("stock_reserved_units_total").increment(u64::from(request.quantity));

        items.push(ReservedItem {
            product,
            quantity: request.quantity,
        });
    }

    let total = total_of(&items)?;
    Ok(Reservation { items, total })
}

/// Returns each item's quantity to its product's stock.
///
/// Must be called at most once per committed item set.
pub async fn release<T: StoreTransaction>(
    tx: &mut T,
    items: &[LineItem],
) -> Result<(), DomainError> {
    lock_products(tx, items.iter().map(|i| i.product_id)).await?;

    for item in items {
        let mut product = tx.find_product_by_id(item.product_id).await?.ok_or_else(|| {
            StoreError::Corrupted(format!(
                "line item {} references missing product {}",
                item.id, item.product_id
            ))
        })?;

        product.stock_quantity = product
            .stock_quantity
            .checked_add(item.quantity)
            .ok_or_else(|| {
                StoreError::Constraint(format!("stock overflow for product {}", product.id))
            })?;
        tx.save_product(&product).await?;

        tracing::debug!(
            product_id = %product.id,
            quantity = item.quantity,
            stock = product.stock_quantity,
            "stock released"
        );
        metrics::counter!("stock_released_units_total").increment(u64::from(item.quantity));
    }

    Ok(())
}

fn total_of(items: &[ReservedItem]) -> Result<Money, OrderError> {
    items
        .iter()
        .try_fold(Money::zero(), |acc, item| {
            item.product
                .unit_price
                .checked_multiply(item.quantity)
                .and_then(|subtotal| acc.checked_add(subtotal))
        })
        .ok_or(OrderError::TotalOverflow)
}
