//! Inbound adapter: decodes substrate messages and dispatches to the saga.

use common::{EventKind, EventMetadata, MessageEnvelope};
use stock_store::StockStore;
use tracing::Instrument;

use crate::error::Result;
use crate::service::StockSagaService;

/// Decodes inbound messages and routes them to the saga handlers.
///
/// The ingress never surfaces an error to the substrate: malformed
/// messages and unknown event types are logged and dropped, and handler
/// failures are logged with the message key. Offset commit is the
/// substrate's concern and proceeds regardless of outcome, so the saga
/// handlers stay idempotent-safe under redelivery.
pub struct EventIngress<S: StockStore> {
    saga: StockSagaService<S>,
}

impl<S: StockStore> EventIngress<S> {
    /// Creates an ingress dispatching to the given saga service.
    pub fn new(saga: StockSagaService<S>) -> Self {
        Self { saga }
    }

    /// Returns a reference to the saga service.
    pub fn saga(&self) -> &StockSagaService<S> {
        &self.saga
    }

    /// Handles one raw message from the substrate.
    pub async fn handle_message(&self, topic: &str, key: &str, raw: &str) {
        metrics::counter!("ingress_messages_total").increment(1);

        let envelope: MessageEnvelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::error!(topic, key, %err, "dropping undecodable message");
                metrics::counter!("ingress_messages_dropped_total").increment(1);
                return;
            }
        };

        let Some(kind) = envelope.kind() else {
            tracing::warn!(
                topic,
                key,
                event_type = %envelope.event_type,
                "dropping message with unknown event type"
            );
            metrics::counter!("ingress_messages_dropped_total").increment(1);
            return;
        };

        // Span context comes from the message itself, parenting this hop
        // on the inbound trace; a message without usable metadata starts a
        // fresh root.
        let metadata = envelope.decode_metadata().ok();
        let span = match &metadata {
            Some(meta) => tracing::info_span!(
                "consume_event",
                topic,
                key,
                event_type = %kind,
                trace_id = %meta.trace_id,
                causation_id = %meta.causation_id,
            ),
            None => tracing::info_span!("consume_event", topic, key, event_type = %kind),
        };

        if let Err(err) = self
            .dispatch(kind, &envelope, metadata)
            .instrument(span)
            .await
        {
            tracing::error!(topic, key, %err, "event handler failed");
        }
    }

    async fn dispatch(
        &self,
        kind: EventKind,
        envelope: &MessageEnvelope,
        metadata: Option<EventMetadata>,
    ) -> Result<()> {
        match kind {
            EventKind::OrderCreated => {
                let payload = envelope.decode_payload()?;
                let metadata = metadata.unwrap_or_else(EventMetadata::root);
                self.saga
                    .process_order_created(&payload, &metadata, envelope.event_id)
                    .await
            }
            EventKind::PaymentSucceeded => {
                let payload = envelope.decode_payload()?;
                self.saga.process_payment_succeeded(&payload).await
            }
            EventKind::PaymentFailed => {
                let payload = envelope.decode_payload()?;
                self.saga.process_payment_failed(&payload).await
            }
            EventKind::StockReserved | EventKind::StockReserveFailed => {
                // our own outbound types; nothing to do if they loop back
                tracing::debug!(event_type = %kind, "ignoring outbound event type on ingress");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use common::{EventId, OrderId, OrderLine, ProductId, SagaEventPayload};
    use stock_store::{InMemoryStockStore, Product};

    use super::*;

    fn envelope(kind: &str, payload: &str, metadata: &str) -> String {
        serde_json::to_string(&MessageEnvelope {
            event_id: EventId::new(),
            aggregate_type: "orders".to_string(),
            aggregate_id: "order-1".to_string(),
            event_type: kind.to_string(),
            payload: payload.to_string(),
            metadata: metadata.to_string(),
        })
        .unwrap()
    }

    fn order_payload(product_id: ProductId, quantity: u32) -> (SagaEventPayload, String) {
        let payload = SagaEventPayload {
            order_id: OrderId::new(),
            total_amount: 5_000,
            items: vec![OrderLine::new(product_id, quantity)],
        };
        let json = serde_json::to_string(&payload).unwrap();
        (payload, json)
    }

    const METADATA: &str =
        r#"{"traceId":"t-1","causationId":"c-1","userId":null,"timestamp":1700000000000}"#;

    async fn ingress_with_product(stock: u32) -> (EventIngress<InMemoryStockStore>, ProductId) {
        let store = InMemoryStockStore::new();
        let product_id = ProductId::new();
        store
            .insert_product(Product::new(product_id, stock))
            .await
            .unwrap();
        (EventIngress::new(StockSagaService::new(store)), product_id)
    }

    #[tokio::test]
    async fn order_created_is_dispatched_to_the_reserve_handler() {
        let (ingress, product_id) = ingress_with_product(10).await;
        let (_, payload_json) = order_payload(product_id, 4);

        ingress
            .handle_message("orders", "order-1", &envelope("ORDER_CREATED", &payload_json, METADATA))
            .await;

        let store = ingress.saga().store();
        let product = store.get_product(product_id).await.unwrap().unwrap();
        assert_eq!(product.stock_available, 6);
        assert_eq!(product.stock_reserved, 4);
        assert_eq!(store.outbox_events().await.len(), 1);
    }

    #[tokio::test]
    async fn payment_events_are_dispatched_to_their_handlers() {
        let (ingress, product_id) = ingress_with_product(10).await;
        let (_, payload_json) = order_payload(product_id, 4);

        ingress
            .handle_message("orders", "order-1", &envelope("ORDER_CREATED", &payload_json, METADATA))
            .await;
        ingress
            .handle_message(
                "payments",
                "order-1",
                &envelope("PAYMENT_FAILED", &payload_json, METADATA),
            )
            .await;

        let store = ingress.saga().store();
        let product = store.get_product(product_id).await.unwrap().unwrap();
        assert_eq!(product.stock_available, 10);
        assert_eq!(product.stock_reserved, 0);

        ingress
            .handle_message("orders", "order-1", &envelope("ORDER_CREATED", &payload_json, METADATA))
            .await;
        ingress
            .handle_message(
                "payments",
                "order-1",
                &envelope("PAYMENT_SUCCEEDED", &payload_json, METADATA),
            )
            .await;

        let product = store.get_product(product_id).await.unwrap().unwrap();
        assert_eq!(product.stock_available, 6);
        assert_eq!(product.stock_reserved, 0);
    }

    #[tokio::test]
    async fn unknown_event_type_is_dropped() {
        let (ingress, product_id) = ingress_with_product(10).await;
        let (_, payload_json) = order_payload(product_id, 4);

        ingress
            .handle_message("orders", "order-1", &envelope("ORDER_ARCHIVED", &payload_json, METADATA))
            .await;

        let store = ingress.saga().store();
        let product = store.get_product(product_id).await.unwrap().unwrap();
        assert_eq!(product.stock_available, 10);
        assert!(store.outbox_events().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_message_is_dropped() {
        let (ingress, product_id) = ingress_with_product(10).await;

        ingress
            .handle_message("orders", "order-1", "not json at all")
            .await;

        let store = ingress.saga().store();
        let product = store.get_product(product_id).await.unwrap().unwrap();
        assert_eq!(product.stock_available, 10);
        assert!(store.outbox_events().await.is_empty());
    }

    #[tokio::test]
    async fn handler_error_is_swallowed() {
        let (ingress, _) = ingress_with_product(10).await;

        // recognized type, undecodable payload: the handler error is
        // logged, never propagated
        ingress
            .handle_message("orders", "order-1", &envelope("ORDER_CREATED", "not json", METADATA))
            .await;

        assert!(ingress.saga().store().outbox_events().await.is_empty());
    }

    #[tokio::test]
    async fn missing_metadata_falls_back_to_a_fresh_root() {
        let (ingress, product_id) = ingress_with_product(10).await;
        let (_, payload_json) = order_payload(product_id, 2);

        ingress
            .handle_message("orders", "order-1", &envelope("ORDER_CREATED", &payload_json, "garbage"))
            .await;

        // the reservation still happens, with root metadata on the event
        let store = ingress.saga().store();
        let product = store.get_product(product_id).await.unwrap().unwrap();
        assert_eq!(product.stock_reserved, 2);

        let events = store.outbox_events().await;
        assert_eq!(events.len(), 1);
        let metadata: common::EventMetadata = serde_json::from_str(&events[0].metadata).unwrap();
        assert!(!metadata.trace_id.is_empty());
    }

    #[tokio::test]
    async fn own_outbound_types_are_ignored() {
        let (ingress, product_id) = ingress_with_product(10).await;
        let (_, payload_json) = order_payload(product_id, 4);

        ingress
            .handle_message("stocks", "order-1", &envelope("STOCK_RESERVED", &payload_json, METADATA))
            .await;

        let store = ingress.saga().store();
        let product = store.get_product(product_id).await.unwrap().unwrap();
        assert_eq!(product.stock_available, 10);
        assert!(store.outbox_events().await.is_empty());
    }
}
