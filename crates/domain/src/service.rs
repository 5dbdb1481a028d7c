//! Order service: the transactional entry point for order operations.

use std::time::Instant;

use chrono::{SubsecRound, Utc};
use common::{CustomerId, OrderId, OrderStatus};
use store::{Store, StoreError, StoreTransaction};

use crate::error::{DomainError, OrderError};
use crate::lifecycle::{StockEffect, TransitionPolicy};
use crate::order::{LineItemDetails, LineItemRequest, Order, OrderDetails, OrderPatch};
use crate::reservation;

/// Service for placing and mutating orders.
///
/// Every mutating operation runs inside one store transaction. The
/// transaction is committed only after every step succeeded; any error
/// returns early and drops it, which rolls back stock decrements and
/// partial writes alike.
pub struct OrderService<S: Store> {
    store: S,
    policy: TransitionPolicy,
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service with the unrestricted transition policy.
    pub fn new(store: S) -> Self {
        Self::with_policy(store, TransitionPolicy::default())
    }

    /// Creates a new order service with the given transition policy.
    pub fn with_policy(store: S, policy: TransitionPolicy) -> Self {
        Self { store, policy }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places a new order for a customer.
    ///
    /// Reserves stock for every requested item and persists the order with
    /// status `Placed` and a total equal to the sum of its line items.
    #[tracing::instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn place_order(
        &self,
        customer_id: CustomerId,
        items: Vec<LineItemRequest>,
    ) -> Result<Order, DomainError> {
        let started = Instant::now();
        let result = self.try_place_order(customer_id, &items).await;
        observe("place_order", started, result)
    }

    async fn try_place_order(
        &self,
        customer_id: CustomerId,
        items: &[LineItemRequest],
    ) -> Result<Order, DomainError> {
        let mut tx = self.store.begin().await?;

        tx.find_customer_by_id(customer_id)
            .await?
            .ok_or(OrderError::InvalidCustomer(customer_id))?;

        let order_id = OrderId::new();
        let (line_items, total) = reservation::reserve(&mut tx, items)
            .await?
            .into_line_items(order_id);

        let order = Order {
            id: order_id,
            customer_id,
            status: OrderStatus::Placed,
            // Microseconds match what PostgreSQL stores.
            created_at: Utc::now().trunc_subsecs(6),
            total,
            items: line_items,
        };

        tx.save_order(&order.record()).await?;
        tx.save_line_items(&order.items).await?;
        tx.commit().await?;

        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(order_id = %order.id, total = %order.total, "order placed");
        Ok(order)
    }

    /// Applies a patch to an existing order.
    ///
    /// A new customer is validated and reassigned. A non-empty item list
    /// releases the current reservation, deletes the current items and
    /// reserves the new ones; the total then reflects only the new items.
    #[tracing::instrument(skip(self))]
    pub async fn update_order(
        &self,
        order_id: OrderId,
        patch: OrderPatch,
    ) -> Result<Order, DomainError> {
        let started = Instant::now();
        let result = self.try_update_order(order_id, patch).await;
        observe("update_order", started, result)
    }

    async fn try_update_order(
        &self,
        order_id: OrderId,
        patch: OrderPatch,
    ) -> Result<Order, DomainError> {
        let mut tx = self.store.begin().await?;
        let mut order = load_order(&mut tx, order_id).await?;

        if let Some(customer_id) = patch.customer_id {
            tx.find_customer_by_id(customer_id)
                .await?
                .ok_or(OrderError::InvalidCustomer(customer_id))?;
            order.customer_id = customer_id;
        }

        let replacement = patch.items.filter(|items| !items.is_empty());
        if let Some(requests) = &replacement {
            if !order.status.holds_stock() {
                return Err(OrderError::OrderCancelled(order_id).into());
            }

            let touched = order.items.iter().map(|i| i.product_id);
            let requested = requests.iter().map(|r| r.product_id);
            reservation::lock_products(&mut tx, touched.chain(requested)).await?;

            reservation::release(&mut tx, &order.items).await?;
            tx.delete_line_items_by_order_id(order_id).await?;

            let (line_items, total) = reservation::reserve(&mut tx, requests)
                .await?
                .into_line_items(order_id);
            order.items = line_items;
            order.total = total;
        }

        tx.save_order(&order.record()).await?;
        if replacement.is_some() {
            tx.save_line_items(&order.items).await?;
        }
        tx.commit().await?;

        metrics::counter!("orders_updated_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            items_replaced = replacement.is_some(),
            total = %order.total,
            "order updated"
        );
        Ok(order)
    }

    /// Deletes an order and its line items.
    ///
    /// Stock still held by the order is released first. A cancelled order
    /// already gave its stock back, so nothing is released twice.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, order_id: OrderId) -> Result<(), DomainError> {
        let started = Instant::now();
        let result = self.try_delete_order(order_id).await;
        observe("delete_order", started, result)
    }

    async fn try_delete_order(&self, order_id: OrderId) -> Result<(), DomainError> {
        let mut tx = self.store.begin().await?;
        let order = load_order(&mut tx, order_id).await?;

        if order.status.holds_stock() {
            reservation::release(&mut tx, &order.items).await?;
        }
        tx.delete_order(order_id).await?;
        tx.commit().await?;

        metrics::counter!("orders_deleted_total").increment(1);
        tracing::info!(%order_id, status = %order.status, "order deleted");
        Ok(())
    }

    /// Moves an order to a new status.
    ///
    /// The transition is checked against the service's policy. Entering
    /// `Cancelled` releases the order's stock; leaving it reserves the same
    /// items again and can fail with `InsufficientStock`.
    #[tracing::instrument(skip(self))]
    pub async fn change_status(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
    ) -> Result<Order, DomainError> {
        let started = Instant::now();
        let result = self.try_change_status(order_id, new_status).await;
        observe("change_status", started, result)
    }

    async fn try_change_status(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
    ) -> Result<Order, DomainError> {
        let mut tx = self.store.begin().await?;
        let mut order = load_order(&mut tx, order_id).await?;
        let previous = order.status;

        self.policy.check(previous, new_status)?;

        match StockEffect::of(previous, new_status) {
            StockEffect::Release => reservation::release(&mut tx, &order.items).await?,
            StockEffect::Reserve => {
                // Line items keep the prices captured when the order was placed.
                reservation::reserve(&mut tx, &order.requests()).await?;
            }
            StockEffect::Keep => {}
        }

        order.status = new_status;
        tx.save_order(&order.record()).await?;
        tx.commit().await?;

        metrics::counter!("order_status_changes_total").increment(1);
        tracing::info!(%order_id, from = %previous, to = %new_status, "order status changed");
        Ok(order)
    }

    /// Loads an order with its customer and every line item's product.
    ///
    /// Reads from one read-only snapshot, so it never waits on writers.
    /// Returns `None` if the order does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_complete(
        &self,
        order_id: OrderId,
    ) -> Result<Option<OrderDetails>, DomainError> {
        let mut tx = self.store.begin_read_only().await?;

        let Some((record, items)) = tx.find_order_with_items(order_id).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        let customer = tx
            .find_customer_by_id(record.customer_id)
            .await?
            .ok_or_else(|| {
                StoreError::Corrupted(format!(
                    "order {} references missing customer {}",
                    record.id, record.customer_id
                ))
            })?;

        let mut details = Vec::with_capacity(items.len());
        for item in &items {
            let product = tx.find_product_by_id(item.product_id).await?.ok_or_else(|| {
                StoreError::Corrupted(format!(
                    "line item {} references missing product {}",
                    item.id, item.product_id
                ))
            })?;
            details.push(LineItemDetails {
                item: item.clone(),
                product,
            });
        }
        tx.rollback().await?;

        Ok(Some(OrderDetails {
            order: Order::from_parts(record, items),
            customer,
            items: details,
        }))
    }
}

async fn load_order<T: StoreTransaction>(
    tx: &mut T,
    order_id: OrderId,
) -> Result<Order, DomainError> {
    let (record, items) = tx
        .find_order_with_items(order_id)
        .await?
        .ok_or(OrderError::OrderNotFound(order_id))?;
    Ok(Order::from_parts(record, items))
}

/// Records duration and outcome metrics for one operation.
fn observe<T>(
    operation: &'static str,
    started: Instant,
    result: Result<T, DomainError>,
) -> Result<T, DomainError> {
    metrics::histogram!("order_transaction_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());

    match &result {
        Err(DomainError::Order(err)) => {
            metrics::counter!("order_rejections_total", "reason" => err.reason()).increment(1);
            tracing::warn!(operation, reason = err.reason(), error = %err, "order request rejected");
        }
        Err(DomainError::Store(err)) => {
            tracing::error!(
                operation,
                transient = err.is_transient(),
                error = %err,
                "order transaction failed"
            );
        }
        Ok(_) => {}
    }

    result
}
