use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use common::{EventId, EventKind, ProductId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OutboxEvent, OutboxStatus, Product, Result, StoreError,
    store::{StockStore, lock_order},
};

/// PostgreSQL-backed store implementation.
///
/// Row locks come from `SELECT … FOR UPDATE` with ids in ascending order;
/// the lock is held until the wrapping transaction commits or rolls back.
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let available: i32 = row.try_get("stock_available")?;
        let reserved: i32 = row.try_get("stock_reserved")?;

        Ok(Product {
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            stock_available: u32::try_from(available).map_err(|_| StoreError::InvalidRow {
                column: "stock_available",
                value: available.to_string(),
            })?,
            stock_reserved: u32::try_from(reserved).map_err(|_| StoreError::InvalidRow {
                column: "stock_reserved",
                value: reserved.to_string(),
            })?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_outbox(row: PgRow) -> Result<OutboxEvent> {
        let event_type: String = row.try_get("event_type")?;
        let status: String = row.try_get("status")?;

        Ok(OutboxEvent {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            aggregate_id: row.try_get("aggregate_id")?,
            event_type: EventKind::parse(&event_type).ok_or_else(|| StoreError::InvalidRow {
                column: "event_type",
                value: event_type.clone(),
            })?,
            payload: row.try_get("payload")?,
            metadata: row.try_get("metadata")?,
            status: OutboxStatus::parse(&status).ok_or_else(|| StoreError::InvalidRow {
                column: "status",
                value: status.clone(),
            })?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        Ok(tx.commit().await?)
    }

    async fn lock_and_fetch(
        &self,
        tx: &mut Self::Tx,
        product_ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>> {
        let ids: Vec<Uuid> = lock_order(product_ids)
            .into_iter()
            .map(|id| id.as_uuid())
            .collect();

        let rows = sqlx::query(
            r#"
            SELECT product_id, stock_available, stock_reserved, created_at, updated_at
            FROM products
            WHERE product_id = ANY($1)
            ORDER BY product_id
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter()
            .map(|row| Self::row_to_product(row).map(|p| (p.product_id, p)))
            .collect()
    }

    async fn save_products(&self, tx: &mut Self::Tx, products: Vec<Product>) -> Result<()> {
        for product in products {
            sqlx::query(
                r#"
                UPDATE products
                SET stock_available = $2, stock_reserved = $3, updated_at = $4
                WHERE product_id = $1
                "#,
            )
            .bind(product.product_id.as_uuid())
            .bind(product.stock_available as i32)
            .bind(product.stock_reserved as i32)
            .bind(product.updated_at)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn append_outbox(&self, tx: &mut Self::Tx, event: OutboxEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events
                (event_id, aggregate_type, aggregate_id, event_type, payload, metadata, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(&event.aggregate_type)
        .bind(&event.aggregate_id)
        .bind(event.event_type.as_str())
        .bind(&event.payload)
        .bind(&event.metadata)
        .bind(event.status.as_str())
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn claim_pending(&self, limit: u32) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, aggregate_type, aggregate_id, event_type, payload, metadata, status, created_at, updated_at
            FROM outbox_events
            WHERE status = 'PENDING'
            ORDER BY updated_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(count = rows.len(), "claimed pending outbox rows");

        rows.into_iter().map(Self::row_to_outbox).collect()
    }

    async fn mark_sent(&self, event_ids: &[EventId]) -> Result<()> {
        if event_ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = event_ids.iter().map(|id| id.as_uuid()).collect();

        sqlx::query(
            "UPDATE outbox_events SET status = 'SENT', updated_at = $2 WHERE event_id = ANY($1)",
        )
        .bind(&ids)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (product_id, stock_available, stock_reserved, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(product.product_id.as_uuid())
        .bind(product.stock_available as i32)
        .bind(product.stock_reserved as i32)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT product_id, stock_available, stock_reserved, created_at, updated_at
            FROM products
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }
}
