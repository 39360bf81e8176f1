//! The saga's transactional handlers.

use std::time::Instant;

use common::{EventId, EventKind, EventMetadata, ProductId, SagaEventPayload};
use stock_store::{OutboxEvent, StockStore};

use crate::error::Result;

/// Topic outbound stock events are routed to.
pub const STOCKS_TOPIC: &str = "stocks";

/// The stock-reservation decision logic.
///
/// Each handler opens one store transaction: ledger reads under row
/// locks, ledger mutations, and the outbox row describing them commit
/// together. A failure anywhere before commit rolls the whole batch back,
/// so partial reservations never become visible.
pub struct StockSagaService<S: StockStore> {
    store: S,
}

impl<S: StockStore> StockSagaService<S> {
    /// Creates a new saga service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handles ORDER_CREATED: reserve stock for every line item, or none.
    ///
    /// Emits STOCK_RESERVED on success, STOCK_RESERVE_FAILED when any item
    /// references an unknown product or asks for more than is available.
    /// `causation` is the inbound event's id and becomes the emitted
    /// event's causation id.
    #[tracing::instrument(skip(self, payload, metadata), fields(order_id = %payload.order_id))]
    pub async fn process_order_created(
        &self,
        payload: &SagaEventPayload,
        metadata: &EventMetadata,
        causation: EventId,
    ) -> Result<()> {
        let started = Instant::now();
        let mut tx = self.store.begin().await?;

        let product_ids: Vec<ProductId> =
            payload.items.iter().map(|line| line.product_id).collect();
        let mut products = self.store.lock_and_fetch(&mut tx, &product_ids).await?;

        // Walk the items in order against the locked rows; the first
        // failure aborts the whole reservation. Reserving directly on the
        // fetched rows keeps a running tally, so an order listing the same
        // product twice cannot pass checks it would fail combined.
        let mut failure = None;
        for line in &payload.items {
            match products.get_mut(&line.product_id) {
                None => {
                    failure = Some(format!("product not found: {}", line.product_id));
                    break;
                }
                Some(product) => {
                    if let Err(err) = product.reserve(line.quantity) {
                        failure = Some(format!("product {}: {}", line.product_id, err));
                        break;
                    }
                }
            }
        }

        if let Some(reason) = failure {
            tracing::warn!(reason, "stock reservation failed");
            // no product save: the locked rows are dropped unmutated
            let event =
                self.outbound_event(EventKind::StockReserveFailed, payload, metadata, causation)?;
            self.store.append_outbox(&mut tx, event).await?;
            self.store.commit(tx).await?;
            metrics::counter!("stock_reservation_failures_total").increment(1);
            return Ok(());
        }

        self.store
            .save_products(&mut tx, products.into_values().collect())
            .await?;
        let event = self.outbound_event(EventKind::StockReserved, payload, metadata, causation)?;
        self.store.append_outbox(&mut tx, event).await?;
        self.store.commit(tx).await?;

        metrics::counter!("stock_reservations_total").increment(1);
        metrics::histogram!("stock_reservation_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!("stock reserved");
        Ok(())
    }

    /// Handles PAYMENT_SUCCEEDED: the reserved units are now permanently
    /// consumed.
    ///
    /// Each line's quantity leaves `stock_reserved`, floored at zero;
    /// `stock_available` is untouched. A floor below the requested
    /// quantity means the accounting has drifted and is logged at error
    /// severity, but the handler proceeds.
    #[tracing::instrument(skip(self, payload), fields(order_id = %payload.order_id))]
    pub async fn process_payment_succeeded(&self, payload: &SagaEventPayload) -> Result<()> {
        let mut tx = self.store.begin().await?;

        let product_ids: Vec<ProductId> =
            payload.items.iter().map(|line| line.product_id).collect();
        let mut products = self.store.lock_and_fetch(&mut tx, &product_ids).await?;

        for line in &payload.items {
            match products.get_mut(&line.product_id) {
                None => {
                    tracing::error!(
                        product_id = %line.product_id,
                        "product missing during stock consumption"
                    );
                    metrics::counter!("stock_ledger_drift_total").increment(1);
                }
                Some(product) => {
                    let consumed = product.consume(line.quantity);
                    if consumed < line.quantity {
                        tracing::error!(
                            product_id = %line.product_id,
                            requested = line.quantity,
                            consumed,
                            "reserved stock below consumed quantity"
                        );
                        metrics::counter!("stock_ledger_drift_total").increment(1);
                    }
                }
            }
        }

        self.store
            .save_products(&mut tx, products.into_values().collect())
            .await?;
        self.store.commit(tx).await?;

        metrics::counter!("stock_confirmations_total").increment(1);
        tracing::info!("reservation consumed");
        Ok(())
    }

    /// Handles PAYMENT_FAILED: compensate by returning reserved units to
    /// available stock.
    ///
    /// The per-item return is clamped at the currently reserved count, so
    /// a compensation replayed or applied to a never-reserved order leaves
    /// the ledger invariants intact at the cost of returning fewer units
    /// than the order asked back.
    #[tracing::instrument(skip(self, payload), fields(order_id = %payload.order_id))]
    pub async fn process_payment_failed(&self, payload: &SagaEventPayload) -> Result<()> {
        let mut tx = self.store.begin().await?;

        let product_ids: Vec<ProductId> =
            payload.items.iter().map(|line| line.product_id).collect();
        let mut products = self.store.lock_and_fetch(&mut tx, &product_ids).await?;

        for line in &payload.items {
            match products.get_mut(&line.product_id) {
                None => {
                    tracing::error!(
                        product_id = %line.product_id,
                        "product missing during stock compensation"
                    );
                    metrics::counter!("stock_ledger_drift_total").increment(1);
                }
                Some(product) => {
                    let released = product.release(line.quantity);
                    if released < line.quantity {
                        tracing::error!(
                            product_id = %line.product_id,
                            requested = line.quantity,
                            released,
                            "reserved stock below released quantity"
                        );
                        metrics::counter!("stock_ledger_drift_total").increment(1);
                    }
                }
            }
        }

        self.store
            .save_products(&mut tx, products.into_values().collect())
            .await?;
        self.store.commit(tx).await?;

        metrics::counter!("stock_compensations_total").increment(1);
        tracing::info!("reservation released");
        Ok(())
    }

    /// Builds the outbox row for an outbound stock event: same payload,
    /// metadata rewritten for this hop.
    fn outbound_event(
        &self,
        kind: EventKind,
        payload: &SagaEventPayload,
        metadata: &EventMetadata,
        causation: EventId,
    ) -> Result<OutboxEvent> {
        let outgoing = metadata.next_hop(causation);
        Ok(OutboxEvent::new(
            kind,
            STOCKS_TOPIC,
            payload.order_id.to_string(),
            serde_json::to_string(payload)?,
            serde_json::to_string(&outgoing)?,
        ))
    }
}
