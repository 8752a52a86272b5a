//! FX engine error types.

use fxgate_common::{UpstreamError, ValidationError};
use fxgate_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the rate cache, registry or conversion engine.
#[derive(Debug, Error)]
pub enum FxError {
    /// Request or cached data broke a business rule.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Upstream provider failed; not retried here.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Shared store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FxError {
    /// Check if the caller may retry later.
    pub fn is_retryable(&self) -> bool {
        match self {
            FxError::Validation(_) => false,
            FxError::Upstream(e) => e.is_retryable(),
            FxError::Store(e) => e.is_retryable(),
        }
    }

    /// Get error code for client responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::Validation(e) => e.error_code(),
            FxError::Upstream(e) => e.error_code(),
            FxError::Store(e) => e.error_code(),
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
