use thiserror::Error;

/// Errors that can occur in the durable layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be mapped back into its domain type.
    #[error("invalid stored value for {column}: {value}")]
    InvalidRow {
        column: &'static str,
        value: String,
    },

    /// A transient infrastructure failure; the operation may be retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
