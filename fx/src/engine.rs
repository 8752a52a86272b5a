//! Conversion engine: cache first, upstream on miss.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fxgate_common::{CurrencyCode, RateSnapshot, UpstreamError, ValidationError};
use fxgate_store::SharedStore;
use tracing::{debug, info, instrument};

use crate::cache::{CacheStats, RateCache, RateCacheConfig};
use crate::conversion::{Conversion, ConversionRequest};
use crate::error::FxResult;
use crate::provider::{CurrencyCatalog, RateProvider};
use crate::registry::{CurrencyRegistry, RegistryConfig};

/// Configuration for the conversion engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cache configuration.
    pub cache: RateCacheConfig,
    /// Registry configuration.
    pub registry: RegistryConfig,
    /// Upper bound on a single upstream fetch.
    pub upstream_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: RateCacheConfig::default(),
            registry: RegistryConfig::default(),
            upstream_timeout: Duration::from_secs(5),
        }
    }
}

/// Answers rate and conversion queries, calling upstream only on cache misses.
pub struct ConversionEngine {
    provider: Arc<dyn RateProvider>,
    cache: RateCache,
    registry: Arc<CurrencyRegistry>,
    config: EngineConfig,
    upstream_calls: AtomicU64,
}

impl ConversionEngine {
    /// Create a new engine over a shared store and the upstream ports.
    ///
    /// `upstream_timeout` bounds catalog fetches as well as rate fetches.
    pub fn new(
        store: Arc<dyn SharedStore>,
        provider: Arc<dyn RateProvider>,
        catalog: Arc<dyn CurrencyCatalog>,
        config: EngineConfig,
    ) -> Self {
        let registry = CurrencyRegistry::with_config(
            Arc::clone(&store),
            catalog,
            RegistryConfig {
                fetch_timeout: config.upstream_timeout,
                ..config.registry.clone()
            },
        );
        Self {
            provider,
            cache: RateCache::with_config(store, config.cache.clone()),
            registry: Arc::new(registry),
            config,
            upstream_calls: AtomicU64::new(0),
        }
    }

    /// Rates from `base`, to `target` or to every currency.
    #[instrument(skip(self))]
    pub async fn rates(&self, base: &str, target: Option<&str>) -> FxResult<RateSnapshot> {
        let base = CurrencyCode::parse(base)?;
        let target = target.map(CurrencyCode::parse).transpose()?;
        if target.as_ref() == Some(&base) {
            return Err(ValidationError::SameCurrency(base).into());
        }
        self.registry.validate(std::iter::once(&base).chain(target.as_ref())).await?;

        if let Some(cached) = self.cache.lookup(&base, target.as_ref()).await? {
            return Ok(cached);
        }

        let requested: Vec<CurrencyCode> = target.iter().cloned().collect();
        let fetched = self.fetch(&base, &requested).await?;

        match &target {
            Some(target) => fetched
                .extract(target)
                .ok_or_else(|| missing_quote(&base, target).into()),
            None => Ok(fetched),
        }
    }

    /// Convert an amount into each requested target currency.
    ///
    /// The request shape is validated before anything else is touched. Targets the
    /// cache cannot answer are fetched together in one upstream call.
    #[instrument(skip(self, request), fields(base = %request.base, amount = request.amount))]
    pub async fn convert(&self, request: ConversionRequest) -> FxResult<Conversion> {
        let (base, targets) = request.validate()?;
        self.registry.validate(std::iter::once(&base).chain(&targets)).await?;

        let mut merged: Option<RateSnapshot> = None;
        let mut misses = Vec::new();
        for target in &targets {
            match self.cache.lookup(&base, Some(target)).await? {
                Some(hit) => merged = Some(merge(merged, hit)),
                None => misses.push(target.clone()),
            }
        }

        if !misses.is_empty() {
            debug!(misses = misses.len(), "Fetching missing rates");
            let fetched = self.fetch(&base, &misses).await?;
            for target in &misses {
                let part = fetched
                    .extract(target)
                    .ok_or_else(|| missing_quote(&base, target))?;
                merged = Some(merge(merged, part));
            }
        }

        let Some(snapshot) = merged else {
            return Err(ValidationError::NoTargets.into());
        };
        let conversion = Conversion::from_snapshot(request.amount, &snapshot);

        info!(
            conversion_id = %conversion.id,
            targets = conversion.conversions.len(),
            fetched = misses.len(),
            "Conversion completed"
        );

        Ok(conversion)
    }

    /// Fetch from upstream within the configured bound and store the result.
    async fn fetch(&self, base: &CurrencyCode, targets: &[CurrencyCode]) -> FxResult<RateSnapshot> {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
        let bound = self.config.upstream_timeout;

        let fetched = tokio::time::timeout(bound, self.provider.fetch_rates(base, targets))
            .await
            .map_err(|_| UpstreamError::Timeout(bound))??;

        if fetched.base() != base {
            return Err(UpstreamError::Malformed(format!(
                "asked for {} rates, got {}",
                base,
                fetched.base()
            ))
            .into());
        }

        self.cache.store_fetched(targets, &fetched).await?;
        debug!(
            provider = self.provider.name(),
            base = %base,
            rates = fetched.len(),
            "Fetched and cached upstream rates"
        );

        Ok(fetched)
    }

    /// The currency registry used for validation.
    pub fn registry(&self) -> &Arc<CurrencyRegistry> {
        &self.registry
    }

    /// Get engine statistics.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cache: self.cache.stats(),
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
        }
    }
}

/// Engine statistics.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub cache: CacheStats,
    pub upstream_calls: u64,
}

fn merge(acc: Option<RateSnapshot>, next: RateSnapshot) -> RateSnapshot {
    match acc {
        Some(acc) => acc.merge(next),
        None => next,
    }
}

fn missing_quote(base: &CurrencyCode, target: &CurrencyCode) -> UpstreamError {
    UpstreamError::Malformed(format!("no {base}/{target} quote in upstream response"))
}
