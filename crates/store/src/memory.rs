use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{EventId, ProductId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    OutboxEvent, OutboxStatus, Product, Result, StoreError,
    store::{StockStore, lock_order},
};

#[derive(Default)]
struct InMemoryState {
    products: HashMap<ProductId, Product>,
    outbox: Vec<OutboxEvent>,
    fail_on_mark_sent: bool,
}

/// In-memory store implementation for testing.
///
/// A transaction owns the store-wide mutex, which serializes concurrent
/// saga invocations the way per-row locks do in Postgres (coarser, but the
/// observable locking contract is the same). Writes are staged on the
/// transaction and applied on commit; dropping the transaction discards
/// them.
#[derive(Clone, Default)]
pub struct InMemoryStockStore {
    state: Arc<Mutex<InMemoryState>>,
}

/// Staged writes plus the exclusive guard standing in for row locks.
pub struct InMemoryTx {
    guard: OwnedMutexGuard<InMemoryState>,
    staged_products: Vec<Product>,
    staged_outbox: Vec<OutboxEvent>,
}

impl InMemoryStockStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All outbox rows, in insertion order.
    pub async fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.state.lock().await.outbox.clone()
    }

    /// Number of outbox rows still pending publication.
    pub async fn pending_count(&self) -> usize {
        self.status_count(OutboxStatus::Pending).await
    }

    /// Number of outbox rows already published.
    pub async fn sent_count(&self) -> usize {
        self.status_count(OutboxStatus::Sent).await
    }

    /// Makes the next `mark_sent` calls fail, simulating a crash between
    /// publish acknowledgment and the status update.
    pub async fn set_fail_on_mark_sent(&self, fail: bool) {
        self.state.lock().await.fail_on_mark_sent = fail;
    }

    async fn status_count(&self, status: OutboxStatus) -> usize {
        self.state
            .lock()
            .await
            .outbox
            .iter()
            .filter(|e| e.status == status)
            .count()
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        Ok(InMemoryTx {
            guard,
            staged_products: Vec::new(),
            staged_outbox: Vec::new(),
        })
    }

    async fn commit(&self, mut tx: InMemoryTx) -> Result<()> {
        for product in tx.staged_products.drain(..) {
            tx.guard.products.insert(product.product_id, product);
        }
        let staged: Vec<OutboxEvent> = tx.staged_outbox.drain(..).collect();
        tx.guard.outbox.extend(staged);
        Ok(())
    }

    async fn lock_and_fetch(
        &self,
        tx: &mut InMemoryTx,
        product_ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>> {
        let found = lock_order(product_ids)
            .into_iter()
            .filter_map(|id| tx.guard.products.get(&id).map(|p| (id, p.clone())))
            .collect();
        Ok(found)
    }

    async fn save_products(&self, tx: &mut InMemoryTx, products: Vec<Product>) -> Result<()> {
        tx.staged_products.extend(products);
        Ok(())
    }

    async fn append_outbox(&self, tx: &mut InMemoryTx, event: OutboxEvent) -> Result<()> {
        tx.staged_outbox.push(event);
        Ok(())
    }

    async fn claim_pending(&self, limit: u32) -> Result<Vec<OutboxEvent>> {
        let state = self.state.lock().await;
        let mut pending: Vec<OutboxEvent> = state
            .outbox
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.updated_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn mark_sent(&self, event_ids: &[EventId]) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_on_mark_sent {
            return Err(StoreError::Unavailable(
                "mark_sent failed by test configuration".to_string(),
            ));
        }
        for event in state.outbox.iter_mut() {
            if event_ids.contains(&event.event_id) {
                event.status = OutboxStatus::Sent;
                event.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn insert_product(&self, product: Product) -> Result<()> {
        let mut state = self.state.lock().await;
        state.products.insert(product.product_id, product);
        Ok(())
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(&product_id).cloned())
    }
}
