//! Order service tests against PostgreSQL.
//!
//! These tests share one PostgreSQL container and run serially.
//! Run with:
//!
//! ```bash
//! cargo test -p domain --test postgres_orders
//! ```

use std::sync::Arc;

use common::{Customer, Money, OrderStatus, Product};
use domain::{LineItemRequest, OrderError, OrderPatch, OrderService};
use serial_test::serial;
use store::{PostgresStore, Store, StoreTransaction};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let store = PostgresStore::connect(&connection_string, 1).await.unwrap();
            store.run_migrations().await.unwrap();
            store.pool().close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

struct Fixture {
    service: OrderService<PostgresStore>,
    customer: Customer,
    p1: Product,
    p2: Product,
}

impl Fixture {
    async fn new() -> Self {
        let info = get_container_info().await;
        let store = PostgresStore::connect(&info.connection_string, 5)
            .await
            .unwrap();

        sqlx::query("TRUNCATE TABLE line_items, orders, products, customers")
            .execute(store.pool())
            .await
            .unwrap();

        let customer = Customer::new("C1");
        sqlx::query("INSERT INTO customers (id, name) VALUES ($1, $2)")
            .bind(customer.id.as_uuid())
            .bind(&customer.name)
            .execute(store.pool())
            .await
            .unwrap();

        let p1 = Product::new("P1", Money::from_cents(1000), 5);
        let p2 = Product::new("P2", Money::from_cents(500), 2);
        let mut tx = store.begin().await.unwrap();
        tx.save_product(&p1).await.unwrap();
        tx.save_product(&p2).await.unwrap();
        tx.commit().await.unwrap();

        Self {
            service: OrderService::new(store),
            customer,
            p1,
            p2,
        }
    }

    async fn stocks(&self) -> (u32, u32) {
        let mut tx = self.service.store().begin().await.unwrap();
        let p1 = tx.find_product_by_id(self.p1.id).await.unwrap().unwrap();
        let p2 = tx.find_product_by_id(self.p2.id).await.unwrap().unwrap();
        tx.rollback().await.unwrap();
        (p1.stock_quantity, p2.stock_quantity)
    }

    fn sample_items(&self) -> Vec<LineItemRequest> {
        vec![
            LineItemRequest::new(self.p1.id, 3),
            LineItemRequest::new(self.p2.id, 2),
        ]
    }
}

#[tokio::test]
#[serial]
async fn place_order_persists_order_and_stock() {
    let fx = Fixture::new().await;

    let order = fx
        .service
        .place_order(fx.customer.id, fx.sample_items())
        .await
        .unwrap();

    assert_eq!(order.total, Money::from_cents(4000));
    assert_eq!(fx.stocks().await, (2, 0));

    let details = fx.service.fetch_complete(order.id).await.unwrap().unwrap();
    assert_eq!(details.order, order);
    assert_eq!(details.customer, fx.customer);
    assert_eq!(details.items[1].product.description, "P2");
}

#[tokio::test]
#[serial]
async fn failed_placement_rolls_back_on_postgres() {
    let fx = Fixture::new().await;

    let err = fx
        .service
        .place_order(
            fx.customer.id,
            vec![
                LineItemRequest::new(fx.p1.id, 3),
                LineItemRequest::new(fx.p2.id, 3),
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_order_error(),
        Some(OrderError::InsufficientStock { .. })
    ));
    assert_eq!(fx.stocks().await, (5, 2));
}

#[tokio::test]
#[serial]
async fn concurrent_orders_never_oversell_on_postgres() {
    let fx = Fixture::new().await;
    let service = Arc::new(fx.service);
    let customer_id = fx.customer.id;
    let (p1, p2) = (fx.p1.id, fx.p2.id);

    let big = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .place_order(
                    customer_id,
                    vec![LineItemRequest::new(p1, 3), LineItemRequest::new(p2, 2)],
                )
                .await
        })
    };
    let small = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .place_order(customer_id, vec![LineItemRequest::new(p2, 1)])
                .await
        })
    };

    let big = big.await.unwrap();
    let small = small.await.unwrap();
    assert_eq!(
        big.is_ok() as u8 + small.is_ok() as u8,
        1,
        "exactly one order must succeed: {big:?} / {small:?}"
    );

    let failure = big.as_ref().err().or(small.as_ref().err()).unwrap();
    assert!(matches!(
        failure.as_order_error(),
        Some(OrderError::InsufficientStock { .. })
    ));

    let mut tx = service.store().begin().await.unwrap();
    let stock = tx.find_product_by_id(p2).await.unwrap().unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(stock.stock_quantity, if small.is_ok() { 1 } else { 0 });
}

#[tokio::test]
#[serial]
async fn update_cancel_and_delete_on_postgres() {
    let fx = Fixture::new().await;
    let order = fx
        .service
        .place_order(fx.customer.id, fx.sample_items())
        .await
        .unwrap();

    let updated = fx
        .service
        .update_order(
            order.id,
            OrderPatch::new().items(vec![LineItemRequest::new(fx.p1.id, 1)]),
        )
        .await
        .unwrap();
    assert_eq!(updated.total, Money::from_cents(1000));
    assert_eq!(fx.stocks().await, (4, 2));

    fx.service
        .change_status(order.id, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(fx.stocks().await, (5, 2));

    fx.service.delete_order(order.id).await.unwrap();
    assert_eq!(fx.stocks().await, (5, 2));
    assert!(fx.service.fetch_complete(order.id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn fetch_complete_does_not_wait_for_writers() {
    let fx = Fixture::new().await;
    let order = fx
        .service
        .place_order(fx.customer.id, fx.sample_items())
        .await
        .unwrap();

    // A writer holds the order row and both product rows.
    let mut writer = fx.service.store().begin().await.unwrap();
    writer.find_order_by_id(order.id).await.unwrap().unwrap();
    writer.find_product_by_id(fx.p1.id).await.unwrap().unwrap();
    writer.find_product_by_id(fx.p2.id).await.unwrap().unwrap();

    let details = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        fx.service.fetch_complete(order.id),
    )
    .await
    .expect("fetch_complete waited on row locks")
    .unwrap()
    .unwrap();

    assert_eq!(details.order, order);
    assert_eq!(details.items.len(), 2);
    writer.rollback().await.unwrap();
}

#[tokio::test]
#[serial]
async fn opposite_order_batches_do_not_deadlock() {
    let fx = Fixture::new().await;
    let a = Product::new("A", Money::from_cents(100), 100);
    let b = Product::new("B", Money::from_cents(200), 100);
    let mut tx = fx.service.store().begin().await.unwrap();
    tx.save_product(&a).await.unwrap();
    tx.save_product(&b).await.unwrap();
    tx.commit().await.unwrap();

    let service = Arc::new(fx.service);
    let customer_id = fx.customer.id;
    let (a_id, b_id) = (a.id, b.id);

    for _ in 0..20 {
        let forward = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .place_order(
                        customer_id,
                        vec![LineItemRequest::new(a_id, 1), LineItemRequest::new(b_id, 1)],
                    )
                    .await
            })
        };
        let backward = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .place_order(
                        customer_id,
                        vec![LineItemRequest::new(b_id, 1), LineItemRequest::new(a_id, 1)],
                    )
                    .await
            })
        };

        let forward = forward.await.unwrap();
        let backward = backward.await.unwrap();
        assert!(forward.is_ok(), "{forward:?}");
        assert!(backward.is_ok(), "{backward:?}");
    }

    let mut tx = service.store().begin().await.unwrap();
    let a = tx.find_product_by_id(a_id).await.unwrap().unwrap();
    let b = tx.find_product_by_id(b_id).await.unwrap().unwrap();
    tx.rollback().await.unwrap();
    assert_eq!((a.stock_quantity, b.stock_quantity), (60, 60));
}
