//! Shared types for the stock-reservation subsystem.
//!
//! Holds the typed identifiers and the wire vocabulary (event kinds,
//! payloads, metadata, envelopes) that the store, relay, and saga crates
//! all speak.

pub mod message;
pub mod types;

pub use message::{EventKind, EventMetadata, MessageEnvelope, OrderLine, SagaEventPayload};
pub use types::{EventId, OrderId, ProductId};
