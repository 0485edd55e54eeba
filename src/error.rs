use thiserror::Error;

/// Crate-wide error type for queue coordination failures.
///
/// Lock contention is deliberately not represented here: a contended
/// conditional update reports zero modified rows and surfaces as `false`
/// from the locking API. Only genuine storage, pool, and configuration
/// failures become errors and propagate to the caller, who owns
/// retry/backoff policy.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Database operation error with operation context
    #[error("Database operation failed: {operation}")]
    Database {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// Connection pool error
    #[error("Connection pool error")]
    ConnectionPool {
        #[source]
        source: anyhow::Error,
    },

    /// Configuration error with key information
    #[error("Configuration error: {key}")]
    Configuration {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<diesel::result::Error> for QueueError {
    fn from(error: diesel::result::Error) -> Self {
        QueueError::Database {
            operation: "database operation".to_string(),
            source: anyhow::Error::from(error),
        }
    }
}

/// Type alias for Result with QueueError to simplify function signatures
pub type QueueResult<T> = Result<T, QueueError>;
