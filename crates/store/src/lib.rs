//! Durable inventory ledger and transactional outbox.
//!
//! The ledger rows ([`Product`]) and the outbox rows ([`OutboxEvent`])
//! describing their mutations are written in the same local transaction,
//! so an event exists exactly when the state change it describes is
//! committed. Publication of those events is a separate, asynchronous
//! concern (see the `relay` crate).

pub mod error;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod product;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStockStore;
pub use outbox::{OutboxEvent, OutboxStatus};
pub use postgres::PostgresStockStore;
pub use product::{InsufficientStock, Product};
pub use store::StockStore;
