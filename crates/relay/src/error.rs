use stock_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the outbox relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The durable layer failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An outbox row could not be serialized for the wire.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The messaging substrate rejected a publish.
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
