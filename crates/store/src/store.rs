use std::collections::HashMap;

use async_trait::async_trait;
use common::{EventId, ProductId};

use crate::{OutboxEvent, Product, Result};

/// Durable storage for the inventory ledger and the transactional outbox.
///
/// Ledger mutations and the outbox rows describing them must commit
/// atomically, so the write-side operations take an explicit transaction
/// handle obtained from `begin`. Dropping an uncommitted transaction rolls
/// back every staged write; that is the all-or-nothing guarantee the saga
/// relies on.
///
/// The relay-side operations (`claim_pending`, `mark_sent`) deliberately
/// run outside any ambient transaction: publication is decoupled from the
/// writes that produced the events.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Transaction handle scoping one saga invocation's reads and writes.
    type Tx: Send;

    /// Opens a transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Commits every write staged on the transaction.
    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    /// Fetches the given products under exclusive row locks held until the
    /// transaction ends.
    ///
    /// Ids are deduplicated and locked in ascending order, so two
    /// reservations touching the same products serialize instead of
    /// deadlocking. Unknown ids are simply absent from the result.
    async fn lock_and_fetch(
        &self,
        tx: &mut Self::Tx,
        product_ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>>;

    /// Stages updated ledger rows for commit.
    async fn save_products(&self, tx: &mut Self::Tx, products: Vec<Product>) -> Result<()>;

    /// Stages one outbox row for commit alongside the ledger mutation it
    /// describes. Never publishes.
    async fn append_outbox(&self, tx: &mut Self::Tx, event: OutboxEvent) -> Result<()>;

    /// Returns up to `limit` pending outbox rows, oldest update first.
    ///
    /// Intended for a single active relay instance; the pending/sent model
    /// carries no claim token.
    async fn claim_pending(&self, limit: u32) -> Result<Vec<OutboxEvent>>;

    /// Transitions the given rows from pending to sent.
    async fn mark_sent(&self, event_ids: &[EventId]) -> Result<()>;

    /// Inserts a new ledger row. Seeding/admin path, not used by the saga.
    async fn insert_product(&self, product: Product) -> Result<()>;

    /// Reads one ledger row without locking it.
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;
}

/// Deduplicates and sorts product ids into the canonical lock order.
pub(crate) fn lock_order(product_ids: &[ProductId]) -> Vec<ProductId> {
    let mut ids = product_ids.to_vec();
    ids.sort();
    ids.dedup();
    ids
}
