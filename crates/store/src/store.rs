use async_trait::async_trait;
use common::{Customer, CustomerId, LineItem, OrderId, OrderRecord, Product, ProductId};

use crate::Result;

/// Entry point to the durable store.
///
/// All reads and writes happen inside a [`StoreTransaction`] obtained from
/// [`Store::begin`]. Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// The transaction type handed out by this store.
    type Transaction: StoreTransaction;

    /// Starts a new transaction.
    async fn begin(&self) -> Result<Self::Transaction>;

    /// Starts a read-only transaction.
    ///
    /// Its lookups see one consistent snapshot and take no row locks, so
    /// they never block or deadlock with writers. Writes through it fail.
    async fn begin_read_only(&self) -> Result<Self::Transaction>;
}

/// A unit of work against the store.
///
/// Writes become visible to other transactions only after [`commit`].
/// Dropping a transaction without committing rolls every write back, so
/// an early `?` return can never leave partial state behind.
///
/// [`commit`]: StoreTransaction::commit
#[async_trait]
pub trait StoreTransaction: Send {
    /// Looks up a product by id.
    ///
    /// Outside a read-only transaction the product row stays locked
    /// against concurrent writers until this transaction ends, so a stock
    /// check followed by a decrement cannot race with another transaction
    /// touching the same product.
    async fn find_product_by_id(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Inserts or replaces a product.
    async fn save_product(&mut self, product: &Product) -> Result<()>;

    /// Looks up a customer by id.
    async fn find_customer_by_id(&mut self, id: CustomerId) -> Result<Option<Customer>>;

    /// Inserts or replaces an order header.
    async fn save_order(&mut self, order: &OrderRecord) -> Result<()>;

    /// Looks up an order header by id, locking it until the transaction
    /// ends unless the transaction is read-only.
    async fn find_order_by_id(&mut self, id: OrderId) -> Result<Option<OrderRecord>>;

    /// Looks up an order header together with its line items, in the
    /// order the items were saved.
    async fn find_order_with_items(
        &mut self,
        id: OrderId,
    ) -> Result<Option<(OrderRecord, Vec<LineItem>)>>;

    /// Deletes an order and, by cascade, its line items.
    ///
    /// Deleting a missing order is a no-op.
    async fn delete_order(&mut self, id: OrderId) -> Result<()>;

    /// Inserts line items. Every item must reference an existing order.
    async fn save_line_items(&mut self, items: &[LineItem]) -> Result<()>;

    /// Deletes all line items belonging to an order.
    async fn delete_line_items_by_order_id(&mut self, id: OrderId) -> Result<()>;

    /// Makes every write of this transaction durable and visible.
    async fn commit(self) -> Result<()>;

    /// Discards every write of this transaction.
    async fn rollback(self) -> Result<()>;
}
