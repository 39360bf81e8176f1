//! Outbox relay: bridges the durable outbox log to the messaging
//! substrate with at-least-once delivery.
//!
//! The relay polls for pending outbox rows on a fixed interval, publishes
//! each one through an [`EventPublisher`], and marks acknowledged events
//! sent. Publish failures and timeouts leave the row pending; the next
//! cycle is the retry mechanism.

pub mod error;
pub mod publisher;
pub mod relay;

pub use error::RelayError;
pub use publisher::{EventPublisher, InMemoryPublisher, PublishedMessage};
pub use relay::{OutboxRelay, RelayConfig};
