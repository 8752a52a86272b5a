//! Gateway error types.

use fxgate_fx::FxError;
use fxgate_limiter::LimiterError;
use fxgate_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the gateway facade.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Fx(#[from] FxError),

    #[error(transparent)]
    Limiter(#[from] LimiterError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// Get error code for client responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "CONFIG_ERROR",
            GatewayError::Fx(e) => e.error_code(),
            GatewayError::Limiter(e) => e.error_code(),
            GatewayError::Store(e) => e.error_code(),
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Config(_) => false,
            GatewayError::Fx(e) => e.is_retryable(),
            GatewayError::Limiter(e) => e.is_retryable(),
            GatewayError::Store(e) => e.is_retryable(),
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
