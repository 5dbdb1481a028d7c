use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{Customer, CustomerId, LineItem, OrderId, OrderRecord, Product, ProductId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    Result, StoreError,
    store::{Store, StoreTransaction},
};

#[derive(Debug, Clone, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    customers: HashMap<CustomerId, Customer>,
    orders: HashMap<OrderId, OrderRecord>,
    line_items: HashMap<OrderId, Vec<LineItem>>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_on_save_order: AtomicBool,
    fail_on_save_line_items: AtomicBool,
}

/// In-memory store implementation for testing.
///
/// Writable transactions are fully serialized: [`Store::begin`] waits
/// until no other writable transaction is open, then works on a private
/// copy of the tables that replaces the committed state on commit.
/// [`Store::begin_read_only`] copies the committed tables without waiting.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a product to the catalog, bypassing transactions.
    pub async fn insert_product(&self, product: Product) {
        let _writer = self.writer.lock().await;
        self.tables
            .write()
            .await
            .products
            .insert(product.id, product);
    }

    /// Adds a customer, bypassing transactions.
    pub async fn insert_customer(&self, customer: Customer) {
        let _writer = self.writer.lock().await;
        self.tables
            .write()
            .await
            .customers
            .insert(customer.id, customer);
    }

    /// Returns the committed state of a product.
    pub async fn product(&self, id: ProductId) -> Option<Product> {
        self.tables.read().await.products.get(&id).cloned()
    }

    /// Returns the committed stock of a product, if it exists.
    pub async fn stock_of(&self, id: ProductId) -> Option<u32> {
        self.product(id).await.map(|p| p.stock_quantity)
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the number of committed line items across all orders.
    pub async fn line_item_count(&self) -> usize {
        self.tables
            .read()
            .await
            .line_items
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Makes every subsequent `save_order` call fail as if the store
    /// became unreachable.
    pub fn set_fail_on_save_order(&self, fail: bool) {
        self.faults.fail_on_save_order.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `save_line_items` call fail as if the store
    /// became unreachable.
    pub fn set_fail_on_save_line_items(&self, fail: bool) {
        self.faults
            .fail_on_save_line_items
            .store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        self.open(false).await
    }

    async fn begin_read_only(&self) -> Result<InMemoryTransaction> {
        self.open(true).await
    }
}

impl InMemoryStore {
    async fn open(&self, read_only: bool) -> Result<InMemoryTransaction> {
        let writer = if read_only {
            None
        } else {
            Some(self.writer.clone().lock_owned().await)
        };
        let working = self.tables.read().await.clone();
        Ok(InMemoryTransaction {
            writer,
            tables: self.tables.clone(),
            working,
            read_only,
            faults: self.faults.clone(),
        })
    }
}

/// A transaction against [`InMemoryStore`].
///
/// A writable transaction holds the writer lock for its whole lifetime.
pub struct InMemoryTransaction {
    writer: Option<OwnedMutexGuard<()>>,
    tables: Arc<RwLock<Tables>>,
    working: Tables,
    read_only: bool,
    faults: Arc<Faults>,
}

impl InMemoryTransaction {
    fn check_writable(&self, operation: &str) -> Result<()> {
        if self.read_only {
            return Err(StoreError::Constraint(format!(
                "{operation} in a read-only transaction"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn find_product_by_id(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn save_product(&mut self, product: &Product) -> Result<()> {
        self.check_writable("save_product")?;
        self.working.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn find_customer_by_id(&mut self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.working.customers.get(&id).cloned())
    }

    async fn save_order(&mut self, order: &OrderRecord) -> Result<()> {
        self.check_writable("save_order")?;
        if self.faults.fail_on_save_order.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "injected failure on save_order".to_string(),
            ));
        }
        if !self.working.customers.contains_key(&order.customer_id) {
            return Err(StoreError::Constraint(format!(
                "order {} references unknown customer {}",
                order.id, order.customer_id
            )));
        }
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_order_by_id(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn find_order_with_items(
        &mut self,
        id: OrderId,
    ) -> Result<Option<(OrderRecord, Vec<LineItem>)>> {
        Ok(self.working.orders.get(&id).map(|order| {
            let items = self
                .working
                .line_items
                .get(&id)
                .cloned()
                .unwrap_or_default();
            (order.clone(), items)
        }))
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<()> {
        self.check_writable("delete_order")?;
        self.working.orders.remove(&id);
        self.working.line_items.remove(&id);
        Ok(())
    }

    async fn save_line_items(&mut self, items: &[LineItem]) -> Result<()> {
        self.check_writable("save_line_items")?;
        if self.faults.fail_on_save_line_items.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "injected failure on save_line_items".to_string(),
            ));
        }
        for item in items {
            if !self.working.orders.contains_key(&item.order_id) {
                return Err(StoreError::Constraint(format!(
                    "line item {} references unknown order {}",
                    item.id, item.order_id
                )));
            }
            if !self.working.products.contains_key(&item.product_id) {
                return Err(StoreError::Constraint(format!(
                    "line item {} references unknown product {}",
                    item.id, item.product_id
                )));
            }
            if item.quantity == 0 {
                return Err(StoreError::Constraint(format!(
                    "line item {} has zero quantity",
                    item.id
                )));
            }
            self.working
                .line_items
                .entry(item.order_id)
                .or_default()
                .push(item.clone());
        }
        Ok(())
    }

    async fn delete_line_items_by_order_id(&mut self, id: OrderId) -> Result<()> {
        self.check_writable("delete_line_items_by_order_id")?;
        self.working.line_items.remove(&id);
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        if self.writer.is_some() {
            *self.tables.write().await = self.working;
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
