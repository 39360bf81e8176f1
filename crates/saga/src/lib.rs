//! Stock-reservation saga for the product service.
//!
//! The choreography step that reacts to order and payment lifecycle
//! events:
//! 1. ORDER_CREATED: reserve stock for every line item, or none, and
//!    emit STOCK_RESERVED / STOCK_RESERVE_FAILED through the outbox.
//! 2. PAYMENT_SUCCEEDED: the reserved units are permanently consumed.
//! 3. PAYMENT_FAILED: compensate by returning the reserved units to
//!    available stock.
//!
//! Every handler runs one local store transaction, so ledger mutations
//! and the outbox events describing them commit atomically. Handlers are
//! idempotent-safe under the substrate's at-least-once redelivery.

pub mod error;
pub mod ingress;
pub mod service;

pub use error::SagaError;
pub use ingress::EventIngress;
pub use service::{STOCKS_TOPIC, StockSagaService};
