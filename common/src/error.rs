//! Error types shared by the FxGate components.

use std::time::Duration;

use crate::CurrencyCode;
use thiserror::Error;

/// A request or a piece of data failed a business rule.
///
/// Validation failures are detected before any upstream access and are never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Not a three-letter code.
    #[error("Malformed currency code: {0:?}")]
    MalformedCurrency(String),

    /// Well-formed code the currency catalog does not know.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(CurrencyCode),

    /// Base and target are the same currency.
    #[error("Base and target currency are both {0}")]
    SameCurrency(CurrencyCode),

    /// Conversion amount is zero, negative or not finite.
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(f64),

    /// Conversion requested without target currencies.
    #[error("At least one target currency is required")]
    NoTargets,

    /// Rate is zero, negative or not finite.
    #[error("Invalid rate {rate} for {base}/{target}")]
    InvalidRate {
        base: CurrencyCode,
        target: CurrencyCode,
        rate: f64,
    },

    /// Snapshot lists its own base currency as a target.
    #[error("Snapshot for {0} contains a rate against itself")]
    BaseInRates(CurrencyCode),

    /// A cached snapshot claiming all currencies for a base lacks one of them.
    #[error("Cached entry {key} has no rate for {missing}")]
    InconsistentCache { key: String, missing: CurrencyCode },
}

impl ValidationError {
    /// Get error code for client responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::MalformedCurrency(_) => "MALFORMED_CURRENCY",
            ValidationError::UnknownCurrency(_) => "UNKNOWN_CURRENCY",
            ValidationError::SameCurrency(_) => "SAME_CURRENCY",
            ValidationError::NonPositiveAmount(_) => "NON_POSITIVE_AMOUNT",
            ValidationError::NoTargets => "NO_TARGETS",
            ValidationError::InvalidRate { .. } => "INVALID_RATE",
            ValidationError::BaseInRates(_) => "BASE_IN_RATES",
            ValidationError::InconsistentCache { .. } => "INCONSISTENT_CACHE",
        }
    }
}

/// The upstream rate provider failed or misbehaved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Non-success HTTP status.
    #[error("Upstream returned HTTP {status}: {info}")]
    Status { status: u16, info: String },

    /// Success status but the payload reports failure.
    #[error("Upstream error {code}: {info}")]
    Api { code: i64, info: String },

    /// No answer within the caller-supplied bound.
    #[error("Upstream timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Connection-level failure.
    #[error("Upstream unreachable: {0}")]
    Transport(String),

    /// Payload could not be interpreted.
    #[error("Malformed upstream payload: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// Get error code for client responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            UpstreamError::Status { .. } => "UPSTREAM_STATUS",
            UpstreamError::Api { .. } => "UPSTREAM_API",
            UpstreamError::Timeout(_) => "UPSTREAM_TIMEOUT",
            UpstreamError::Transport(_) => "UPSTREAM_TRANSPORT",
            UpstreamError::Malformed(_) => "UPSTREAM_MALFORMED",
        }
    }

    /// Whether a caller may reasonably retry later. The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Timeout(_) | UpstreamError::Transport(_) => true,
            UpstreamError::Status { status, .. } => *status == 429 || *status >= 500,
            UpstreamError::Api { .. } | UpstreamError::Malformed(_) => false,
        }
    }
}
