//! Admission limiter over the shared store.

use std::sync::Arc;
use std::time::Duration;

use fxgate_common::{Clock, SystemClock};
use fxgate_store::SharedStore;
use tracing::{debug, warn};

use crate::bucket::LEAKY_BUCKET;
use crate::error::{LimiterError, LimiterResult};

/// Limiter configuration.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Units drained per second.
    pub drain_rate: f64,
    /// Bucket capacity.
    pub capacity: f64,
    /// Prefix of bucket keys in the shared store.
    pub key_prefix: String,
    /// Idle time after which a bucket is dropped from the store. Never shorter than
    /// the time a full bucket takes to drain.
    pub state_ttl: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            drain_rate: 1.0,
            capacity: 10.0,
            key_prefix: "ratelimit:".to_string(),
            state_ttl: Duration::from_secs(3600),
        }
    }
}

impl LimiterConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.drain_rate.is_finite() && self.drain_rate > 0.0) {
            return Err(format!("Drain rate must be positive, got {}", self.drain_rate));
        }

        if !(self.capacity.is_finite() && self.capacity >= 1.0) {
            return Err(format!("Capacity must be at least 1, got {}", self.capacity));
        }

        if self.state_ttl.is_zero() {
            return Err("Bucket state TTL cannot be zero".to_string());
        }

        Ok(())
    }

    /// Bucket TTL actually applied: `state_ttl`, raised to the full drain time.
    pub fn effective_ttl(&self) -> Duration {
        let drain = (self.capacity / self.drain_rate).ceil();
        let drain = Duration::try_from_secs_f64(drain).unwrap_or(Duration::MAX);
        self.state_ttl.max(drain)
    }
}

/// Per-identity leaky-bucket admission control.
///
/// Holds no lock of its own: every decision is one atomic script run by the store.
#[derive(Debug)]
pub struct AdmissionLimiter {
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    config: LimiterConfig,
}

impl AdmissionLimiter {
    /// Create a limiter on the system clock.
    pub fn new(store: Arc<dyn SharedStore>, config: LimiterConfig) -> LimiterResult<Self> {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    /// Create a limiter with an injected clock.
    pub fn with_clock(
        store: Arc<dyn SharedStore>,
        clock: Arc<dyn Clock>,
        config: LimiterConfig,
    ) -> LimiterResult<Self> {
        config.validate().map_err(LimiterError::InvalidConfig)?;
        Ok(Self {
            store,
            clock,
            config,
        })
    }

    /// Whether a request from `identity` may proceed.
    pub async fn allow(&self, identity: &str) -> LimiterResult<bool> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(LimiterError::BlankIdentity);
        }

        let key = self.key(identity);
        let now = self.clock.epoch_seconds();
        let args = [now as f64, self.config.drain_rate, self.config.capacity];

        let admitted = self
            .store
            .eval(&LEAKY_BUCKET, &key, &args, Some(self.config.effective_ttl()))
            .await?;

        if admitted {
            debug!(identity, "Request admitted");
        } else {
            warn!(identity, capacity = self.config.capacity, "Request throttled");
        }

        Ok(admitted)
    }

    /// Get the limiter configuration.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    fn key(&self, identity: &str) -> String {
        format!("{}{}", self.config.key_prefix, identity)
    }
}
