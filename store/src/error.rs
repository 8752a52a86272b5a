//! Store error types.

use thiserror::Error;

/// Errors raised by shared store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend command or connection failed.
    #[error("Store backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// Value could not be encoded or decoded at the store boundary.
    #[error("Store serialization error for {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Atomic script returned something other than a boolean.
    #[error("Script {script} returned unexpected reply: {reply}")]
    UnexpectedReply { script: &'static str, reply: String },
}

impl StoreError {
    /// Get error code for client responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::Backend(_) => "STORE_BACKEND",
            StoreError::Serialization { .. } => "STORE_SERIALIZATION",
            StoreError::UnexpectedReply { .. } => "STORE_SCRIPT_REPLY",
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Backend(e) => {
                e.is_io_error() || e.is_timeout() || e.is_connection_dropped()
            }
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
