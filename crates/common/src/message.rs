//! Wire vocabulary shared by the saga, the outbox, and the relay.
//!
//! Field names follow the camelCase JSON the order and payment services
//! already put on the bus (`eventId`, `aggregateType`, `orderId`, …).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{EventId, OrderId, ProductId};

/// The closed set of event types this subsystem consumes or emits.
///
/// Inbound strings outside this set are not an error; [`EventKind::parse`]
/// returns `None` and the ingress logs and drops the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    OrderCreated,
    StockReserved,
    StockReserveFailed,
    PaymentSucceeded,
    PaymentFailed,
}

impl EventKind {
    /// The wire name, e.g. `"ORDER_CREATED"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OrderCreated => "ORDER_CREATED",
            EventKind::StockReserved => "STOCK_RESERVED",
            EventKind::StockReserveFailed => "STOCK_RESERVE_FAILED",
            EventKind::PaymentSucceeded => "PAYMENT_SUCCEEDED",
            EventKind::PaymentFailed => "PAYMENT_FAILED",
        }
    }

    /// Parses a wire name, returning `None` for anything outside the set.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ORDER_CREATED" => Some(EventKind::OrderCreated),
            "STOCK_RESERVED" => Some(EventKind::StockReserved),
            "STOCK_RESERVE_FAILED" => Some(EventKind::StockReserveFailed),
            "PAYMENT_SUCCEEDED" => Some(EventKind::PaymentSucceeded),
            "PAYMENT_FAILED" => Some(EventKind::PaymentFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line item of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// The order data carried between saga hops.
///
/// The same payload travels on ORDER_CREATED, STOCK_RESERVED/FAILED, and
/// PAYMENT_* events so every participant can re-derive the affected
/// products without a second lookup of the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaEventPayload {
    pub order_id: OrderId,
    /// Order total in minor currency units.
    pub total_amount: i64,
    pub items: Vec<OrderLine>,
}

/// Trace and causation envelope, rewritten at every hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub trace_id: String,
    /// Event id of the message that caused this one.
    pub causation_id: String,
    pub user_id: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl EventMetadata {
    /// Metadata for the next hop: trace and user carried over, causation
    /// pointing at the inbound event, timestamp freshly stamped.
    pub fn next_hop(&self, causation: EventId) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            causation_id: causation.to_string(),
            user_id: self.user_id.clone(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Fresh root metadata for a message that arrived without any.
    pub fn root() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            causation_id: String::new(),
            user_id: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// The message shape every topic carries, inbound and outbound.
///
/// `payload` and `metadata` are JSON-encoded strings rather than nested
/// objects: the envelope treats them as opaque and only the saga
/// interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub event_id: EventId,
    /// Destination topic.
    pub aggregate_type: String,
    /// Partition/routing key; the order id for saga events.
    pub aggregate_id: String,
    /// Raw wire value; see [`MessageEnvelope::kind`].
    pub event_type: String,
    pub payload: String,
    pub metadata: String,
}

impl MessageEnvelope {
    /// The event type, if it belongs to the closed set.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::parse(&self.event_type)
    }

    /// Decodes the payload string.
    pub fn decode_payload<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.payload)
    }

    /// Decodes the metadata string.
    pub fn decode_metadata(&self) -> serde_json::Result<EventMetadata> {
        serde_json::from_str(&self.metadata)
    }
}
