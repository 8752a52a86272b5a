//! Limiter error types.

use fxgate_store::StoreError;
use thiserror::Error;

/// Errors from admission control. A denied request is not an error.
#[derive(Error, Debug)]
pub enum LimiterError {
    #[error("Invalid limiter configuration: {0}")]
    InvalidConfig(String),

    #[error("Blank identity")]
    BlankIdentity,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LimiterError {
    /// Get error code for reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            LimiterError::InvalidConfig(_) => "LIMITER_INVALID_CONFIG",
            LimiterError::BlankIdentity => "LIMITER_BLANK_IDENTITY",
            LimiterError::Store(e) => e.error_code(),
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LimiterError::Store(e) if e.is_retryable())
    }
}

/// Result type for limiter operations.
pub type LimiterResult<T> = Result<T, LimiterError>;
