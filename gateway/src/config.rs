//! Gateway configuration.

use std::time::Duration;

use fxgate_common::{default_catalog_ttl, default_rate_ttl};
use fxgate_fx::{EngineConfig, RateCacheConfig, RegistryConfig};
use fxgate_limiter::LimiterConfig;

/// Upstream rate source configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the exchangerate.host API.
    pub base_url: String,
    /// Access key sent with every request.
    pub api_key: Option<String>,
    /// Upper bound on a single upstream call.
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.exchangerate.host".to_string(),
            api_key: None,
            timeout: Duration::from_millis(5000),
        }
    }
}

/// Main gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Redis URL. The in-process store is used when absent.
    pub redis_url: Option<String>,
    /// Upstream configuration.
    pub upstream: UpstreamConfig,
    /// TTL of cached rate snapshots.
    pub rate_ttl: Duration,
    /// TTL of the shared currency catalog copy.
    pub catalog_ttl: Duration,
    /// Limiter configuration.
    pub limiter: LimiterConfig,
    /// Log level.
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            upstream: UpstreamConfig::default(),
            rate_ttl: default_rate_ttl(),
            catalog_ttl: default_catalog_ttl(),
            limiter: LimiterConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("FXGATE_REDIS_URL").filter(|u| !u.is_empty()) {
            config.redis_url = Some(url);
        }

        if let Some(url) = lookup("FXGATE_UPSTREAM_URL") {
            config.upstream.base_url = url;
        }

        if let Some(key) = lookup("FXGATE_UPSTREAM_API_KEY").filter(|k| !k.is_empty()) {
            config.upstream.api_key = Some(key);
        }

        if let Some(ms) = lookup("FXGATE_UPSTREAM_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            config.upstream.timeout = Duration::from_millis(ms);
        }

        if let Some(secs) = lookup("FXGATE_RATE_TTL_SECS").and_then(|v| v.parse().ok()) {
            config.rate_ttl = Duration::from_secs(secs);
        }

        if let Some(secs) = lookup("FXGATE_CATALOG_TTL_SECS").and_then(|v| v.parse().ok()) {
            config.catalog_ttl = Duration::from_secs(secs);
        }

        if let Some(rate) = lookup("FXGATE_LIMITER_DRAIN_RATE").and_then(|v| v.parse().ok()) {
            config.limiter.drain_rate = rate;
        }

        if let Some(capacity) = lookup("FXGATE_LIMITER_CAPACITY").and_then(|v| v.parse().ok()) {
            config.limiter.capacity = capacity;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.upstream.base_url.is_empty() {
            return Err("Upstream URL cannot be empty".to_string());
        }

        if self.upstream.timeout.is_zero() {
            return Err("Upstream timeout cannot be 0".to_string());
        }

        if self.rate_ttl.is_zero() {
            return Err("Rate TTL cannot be 0".to_string());
        }

        if self.catalog_ttl.is_zero() {
            return Err("Catalog TTL cannot be 0".to_string());
        }

        self.limiter.validate()
    }

    /// Engine configuration derived from this one.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cache: RateCacheConfig { ttl: self.rate_ttl },
            registry: RegistryConfig {
                catalog_ttl: self.catalog_ttl,
                fetch_timeout: self.upstream.timeout,
            },
            upstream_timeout: self.upstream.timeout,
        }
    }
}
