use async_trait::async_trait;
use common::{
    Customer, CustomerId, LineItem, LineItemId, Money, OrderId, OrderRecord, OrderStatus, Product,
    ProductId,
};
use sqlx::{
    PgPool, Postgres, Row, Transaction,
    postgres::{PgPoolOptions, PgRow},
};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{Store, StoreTransaction},
};

/// PostgreSQL-backed store implementation.
///
/// Transactions run at READ COMMITTED. Product and order rows are read
/// with `FOR UPDATE`, so a transaction that checks stock and then
/// decrements it holds the product row lock until it commits and the
/// `products_stock_non_negative` check backs the invariant at the
/// schema level. Read-only transactions see one snapshot and lock
/// nothing.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool of at most `max_connections` to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        tracing::info!(max_connections, "connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction {
            tx,
            lock_rows: true,
        })
    }

    async fn begin_read_only(&self) -> Result<PostgresTransaction> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(PostgresTransaction {
            tx,
            lock_rows: false,
        })
    }
}

/// A transaction against [`PostgresStore`].
///
/// Wraps a sqlx transaction, which rolls back when dropped uncommitted.
/// Read-only transactions run at REPEATABLE READ and skip `FOR UPDATE`.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    lock_rows: bool,
}

const PRODUCT_BY_ID: &str = r#"
    SELECT id, description, unit_price_cents, stock_quantity
    FROM products
    WHERE id = $1
"#;

const ORDER_BY_ID: &str = r#"
    SELECT id, customer_id, status, created_at, total_cents
    FROM orders
    WHERE id = $1
"#;

impl PostgresTransaction {
    fn row_lookup(&self, select: &str) -> String {
        if self.lock_rows {
            format!("{select} FOR UPDATE")
        } else {
            select.to_string()
        }
    }
}

fn decode_count(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::Corrupted(format!("negative {column}: {value}")))
}

fn encode_count(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::Constraint(format!("{column} out of range: {value}")))
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        description: row.try_get("description")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        stock_quantity: decode_count(row.try_get("stock_quantity")?, "stock_quantity")?,
    })
}

fn row_to_order(row: PgRow) -> Result<OrderRecord> {
    let status: String = row.try_get("status")?;
    Ok(OrderRecord {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        status: status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Corrupted(e.to_string()))?,
        created_at: row.try_get("created_at")?,
        total: Money::from_cents(row.try_get("total_cents")?),
    })
}

fn row_to_line_item(row: PgRow) -> Result<LineItem> {
    Ok(LineItem {
        id: LineItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: decode_count(row.try_get("quantity")?, "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
    })
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn find_product_by_id(&mut self, id: ProductId) -> Result<Option<Product>> {
        let sql = self.row_lookup(PRODUCT_BY_ID);
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(row_to_product).transpose()
    }

    async fn save_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, description, unit_price_cents, stock_quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                description = EXCLUDED.description,
                unit_price_cents = EXCLUDED.unit_price_cents,
                stock_quantity = EXCLUDED.stock_quantity
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.description)
        .bind(product.unit_price.cents())
        .bind(encode_count(product.stock_quantity, "stock_quantity")?)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_customer_by_id(&mut self, id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query("SELECT id, name FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => Ok(Some(Customer {
                id: CustomerId::from_uuid(row.try_get::<Uuid, _>("id")?),
                name: row.try_get("name")?,
            })),
            None => Ok(None),
        }
    }

    async fn save_order(&mut self, order: &OrderRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, status, created_at, total_cents)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                status = EXCLUDED.status,
                total_cents = EXCLUDED.total_cents
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.total.cents())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_order_by_id(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        let sql = self.row_lookup(ORDER_BY_ID);
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(row_to_order).transpose()
    }

    async fn find_order_with_items(
        &mut self,
        id: OrderId,
    ) -> Result<Option<(OrderRecord, Vec<LineItem>)>> {
        let Some(order) = self.find_order_by_id(id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, quantity, unit_price_cents
            FROM line_items
            WHERE order_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        let items = rows
            .into_iter()
            .map(row_to_line_item)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some((order, items)))
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<()> {
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn save_line_items(&mut self, items: &[LineItem]) -> Result<()> {
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO line_items (id, order_id, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(encode_count(item.quantity, "quantity")?)
            .bind(item.unit_price.cents())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn delete_line_items_by_order_id(&mut self, id: OrderId) -> Result<()> {
        sqlx::query("DELETE FROM line_items WHERE order_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_counts_are_reported_as_corruption() {
        assert_eq!(decode_count(3, "stock_quantity").unwrap(), 3);
        assert!(matches!(
            decode_count(-1, "stock_quantity"),
            Err(StoreError::Corrupted(_))
        ));
    }

    #[test]
    fn oversized_counts_are_rejected_before_writing() {
        assert_eq!(encode_count(7, "quantity").unwrap(), 7);
        assert!(matches!(
            encode_count(u32::MAX, "quantity"),
            Err(StoreError::Constraint(_))
        ));
    }
}
