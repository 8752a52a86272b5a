//! FxGate Admission Limiter
//!
//! Per-identity leaky-bucket admission control. Bucket state lives in the shared
//! store and is updated by one atomic script per request, so every gateway instance
//! sees the same buckets.

pub mod bucket;
pub mod error;
pub mod limiter;

pub use bucket::{BucketState, LEAKY_BUCKET};
pub use error::{LimiterError, LimiterResult};
pub use limiter::{AdmissionLimiter, LimiterConfig};
