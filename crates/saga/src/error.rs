use stock_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the saga handlers.
///
/// Validation failures (unknown product, insufficient stock) are business
/// outcomes, not errors: they surface as STOCK_RESERVE_FAILED events and
/// never through this type.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The durable layer failed; the transaction rolled back.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A payload or metadata blob could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for saga operations.
pub type Result<T> = std::result::Result<T, SagaError>;
