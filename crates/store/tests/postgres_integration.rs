//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p stock-store --test postgres_integration
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use common::{EventKind, ProductId};
use serial_test::serial;
use sqlx::PgPool;
use stock_store::{OutboxEvent, OutboxStatus, PostgresStockStore, Product, StockStore};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

#[ctor::ctor]
fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_stock_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStockStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    // Clear tables for test isolation
    sqlx::query("TRUNCATE TABLE products, outbox_events")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStockStore::new(pool)
}

fn pending_event(aggregate_id: &str) -> OutboxEvent {
    OutboxEvent::new(
        EventKind::StockReserved,
        "stocks",
        aggregate_id,
        r#"{"orderId":"o"}"#,
        r#"{"traceId":"t","causationId":"c","userId":null,"timestamp":0}"#,
    )
}

#[tokio::test]
#[serial]
async fn insert_and_get_product_roundtrip() {
    let store = get_test_store().await;
    let product_id = ProductId::new();

    store
        .insert_product(Product::new(product_id, 25))
        .await
        .unwrap();

    let product = store.get_product(product_id).await.unwrap().unwrap();
    assert_eq!(product.product_id, product_id);
    assert_eq!(product.stock_available, 25);
    assert_eq!(product.stock_reserved, 0);

    let missing = store.get_product(ProductId::new()).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
#[serial]
async fn lock_and_fetch_returns_requested_rows() {
    let store = get_test_store().await;
    let p1 = ProductId::new();
    let p2 = ProductId::new();
    store.insert_product(Product::new(p1, 5)).await.unwrap();
    store.insert_product(Product::new(p2, 7)).await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let products = store
        .lock_and_fetch(&mut tx, &[p2, p1, ProductId::new()])
        .await
        .unwrap();
    store.commit(tx).await.unwrap();

    assert_eq!(products.len(), 2);
    assert_eq!(products[&p1].stock_available, 5);
    assert_eq!(products[&p2].stock_available, 7);
}

#[tokio::test]
#[serial]
async fn row_locks_serialize_concurrent_transactions() {
    let store = get_test_store().await;
    let product_id = ProductId::new();
    store
        .insert_product(Product::new(product_id, 10))
        .await
        .unwrap();

    let mut tx1 = store.begin().await.unwrap();
    let _locked = store.lock_and_fetch(&mut tx1, &[product_id]).await.unwrap();

    let contender = store.clone();
    let acquired = Arc::new(AtomicBool::new(false));
    let acquired_flag = acquired.clone();
    let handle = tokio::spawn(async move {
        let mut tx2 = contender.begin().await.unwrap();
        let products = contender
            .lock_and_fetch(&mut tx2, &[product_id])
            .await
            .unwrap();
        acquired_flag.store(true, Ordering::SeqCst);
        contender.commit(tx2).await.unwrap();
        products
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        !acquired.load(Ordering::SeqCst),
        "second transaction should wait on the row lock"
    );

    store.commit(tx1).await.unwrap();

    let products = handle.await.unwrap();
    assert!(acquired.load(Ordering::SeqCst));
    assert!(products.contains_key(&product_id));
}

#[tokio::test]
#[serial]
async fn outbox_row_commits_atomically_with_ledger_mutation() {
    let store = get_test_store().await;
    let product_id = ProductId::new();
    store
        .insert_product(Product::new(product_id, 10))
        .await
        .unwrap();

    let event = pending_event("order-1");
    let event_id = event.event_id;

    let mut tx = store.begin().await.unwrap();
    let mut products = store.lock_and_fetch(&mut tx, &[product_id]).await.unwrap();
    products.get_mut(&product_id).unwrap().reserve(4).unwrap();
    store
        .save_products(&mut tx, products.into_values().collect())
        .await
        .unwrap();
    store.append_outbox(&mut tx, event).await.unwrap();

    // neither write is visible before commit
    assert!(store.claim_pending(10).await.unwrap().is_empty());

    store.commit(tx).await.unwrap();

    let product = store.get_product(product_id).await.unwrap().unwrap();
    assert_eq!(product.stock_available, 6);
    assert_eq!(product.stock_reserved, 4);

    let claimed = store.claim_pending(10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].event_id, event_id);
    assert_eq!(claimed[0].event_type, EventKind::StockReserved);
    assert_eq!(claimed[0].aggregate_type, "stocks");
    assert_eq!(claimed[0].aggregate_id, "order-1");
    assert_eq!(claimed[0].status, OutboxStatus::Pending);
}

#[tokio::test]
#[serial]
async fn dropped_transaction_rolls_back_both_writes() {
    let store = get_test_store().await;
    let product_id = ProductId::new();
    store
        .insert_product(Product::new(product_id, 10))
        .await
        .unwrap();

    {
        let mut tx = store.begin().await.unwrap();
        let mut products = store.lock_and_fetch(&mut tx, &[product_id]).await.unwrap();
        products.get_mut(&product_id).unwrap().reserve(4).unwrap();
        store
            .save_products(&mut tx, products.into_values().collect())
            .await
            .unwrap();
        store
            .append_outbox(&mut tx, pending_event("order-1"))
            .await
            .unwrap();
        // tx dropped without commit
    }

    let product = store.get_product(product_id).await.unwrap().unwrap();
    assert_eq!(product.stock_available, 10);
    assert_eq!(product.stock_reserved, 0);
    assert!(store.claim_pending(10).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn claim_pending_orders_by_updated_at_and_limits() {
    let store = get_test_store().await;

    let mut oldest = pending_event("order-1");
    oldest.updated_at = Utc::now() - chrono::Duration::seconds(30);
    let mut middle = pending_event("order-2");
    middle.updated_at = Utc::now() - chrono::Duration::seconds(20);
    let newest = pending_event("order-3");

    // insert newest first to prove ordering comes from updated_at
    let mut tx = store.begin().await.unwrap();
    store.append_outbox(&mut tx, newest).await.unwrap();
    store.append_outbox(&mut tx, middle.clone()).await.unwrap();
    store.append_outbox(&mut tx, oldest.clone()).await.unwrap();
    store.commit(tx).await.unwrap();

    let claimed = store.claim_pending(2).await.unwrap();
    assert_eq!(claimed.len(), 2);
    assert_eq!(claimed[0].event_id, oldest.event_id);
    assert_eq!(claimed[1].event_id, middle.event_id);
}

#[tokio::test]
#[serial]
async fn mark_sent_removes_rows_from_claim() {
    let store = get_test_store().await;

    let first = pending_event("order-1");
    let second = pending_event("order-2");
    let first_id = first.event_id;
    let second_id = second.event_id;

    let mut tx = store.begin().await.unwrap();
    store.append_outbox(&mut tx, first).await.unwrap();
    store.append_outbox(&mut tx, second).await.unwrap();
    store.commit(tx).await.unwrap();

    store.mark_sent(&[first_id]).await.unwrap();

    let claimed = store.claim_pending(10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].event_id, second_id);

    // sent rows stay in the table for audit
    let status: String =
        sqlx::query_scalar("SELECT status FROM outbox_events WHERE event_id = $1")
            .bind(first_id.as_uuid())
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(status, "SENT");
}
