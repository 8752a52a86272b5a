//! Rate snapshot cache with cross-pair derivation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fxgate_common::{default_rate_ttl, CurrencyCode, RateSnapshot, ValidationError};
use fxgate_store::{SharedStore, TypedCache};
use tracing::debug;

use crate::error::FxResult;

/// Where a cached snapshot lives: one pair, or every target from a base.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub base: CurrencyCode,
    /// `None` is the ALL-sentinel.
    pub target: Option<CurrencyCode>,
}

impl CacheKey {
    pub fn pair(base: &CurrencyCode, target: &CurrencyCode) -> Self {
        Self {
            base: base.clone(),
            target: Some(target.clone()),
        }
    }

    pub fn all(base: &CurrencyCode) -> Self {
        Self {
            base: base.clone(),
            target: None,
        }
    }

    /// Key under which `snapshot` is stored: its single target, else ALL.
    pub fn for_snapshot(snapshot: &RateSnapshot) -> Self {
        match snapshot.sole_target() {
            Some(target) => Self::pair(snapshot.base(), target),
            None => Self::all(snapshot.base()),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "rates:{}:{}", self.base, target),
            None => write!(f, "rates:{}", self.base),
        }
    }
}

/// Configuration for rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// TTL applied to snapshots stored from upstream fetches.
    pub ttl: Duration,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_rate_ttl(),
        }
    }
}

/// Which derivation step answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    Exact,
    Reciprocal,
    TargetBroad,
    BaseBroad,
}

#[derive(Debug, Default)]
struct Counters {
    exact: AtomicU64,
    reciprocal: AtomicU64,
    target_broad: AtomicU64,
    base_broad: AtomicU64,
    misses: AtomicU64,
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub exact_hits: u64,
    pub reciprocal_hits: u64,
    pub target_broad_hits: u64,
    pub base_broad_hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.exact_hits + self.reciprocal_hits + self.target_broad_hits + self.base_broad_hits
    }
}

/// Rate cache over the shared store.
///
/// Lookups never reach upstream. A pair lookup that has no exact entry is answered,
/// in order, from the reversed pair, from the target's ALL snapshot, then from the
/// base's ALL snapshot. Derived answers are returned but never written back.
pub struct RateCache {
    snapshots: TypedCache<RateSnapshot>,
    config: RateCacheConfig,
    counters: Counters,
}

impl RateCache {
    /// Create a rate cache with default configuration.
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self::with_config(store, RateCacheConfig::default())
    }

    /// Create a rate cache with custom configuration.
    pub fn with_config(store: Arc<dyn SharedStore>, config: RateCacheConfig) -> Self {
        Self {
            snapshots: TypedCache::new(store),
            config,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &RateCacheConfig {
        &self.config
    }

    /// Look up rates from `base`, to `target` or to all currencies.
    pub async fn lookup(
        &self,
        base: &CurrencyCode,
        target: Option<&CurrencyCode>,
    ) -> FxResult<Option<RateSnapshot>> {
        let found = match target {
            None => self
                .get(&CacheKey::all(base))
                .await?
                .map(|snapshot| (HitKind::Exact, snapshot)),
            Some(target) => self.derive(base, target).await?,
        };

        match &found {
            Some((kind, _)) => {
                self.record(*kind);
                debug!(base = %base, target = ?target, kind = ?kind, "Cache hit");
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(base = %base, target = ?target, "Cache miss");
            }
        }

        Ok(found.map(|(_, snapshot)| snapshot))
    }

    async fn derive(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> FxResult<Option<(HitKind, RateSnapshot)>> {
        if base == target {
            return Err(ValidationError::SameCurrency(base.clone()).into());
        }

        if let Some(exact) = self.get(&CacheKey::pair(base, target)).await? {
            return Ok(Some((HitKind::Exact, exact)));
        }

        if let Some(reversed) = self.get(&CacheKey::pair(target, base)).await? {
            match reversed.reciprocal(base) {
                Some(derived) => return Ok(Some((HitKind::Reciprocal, derived))),
                None => debug!(base = %base, target = %target, "Reversed pair lacks base rate"),
            }
        }

        let target_key = CacheKey::all(target);
        if let Some(broad) = self.get(&target_key).await? {
            let derived = broad
                .reciprocal(base)
                .ok_or_else(|| inconsistent(&target_key, base))?;
            return Ok(Some((HitKind::TargetBroad, derived)));
        }

        let base_key = CacheKey::all(base);
        if let Some(broad) = self.get(&base_key).await? {
            let extracted = broad
                .extract(target)
                .ok_or_else(|| inconsistent(&base_key, target))?;
            return Ok(Some((HitKind::BaseBroad, extracted)));
        }

        Ok(None)
    }

    /// Store a snapshot at its natural key, replacing any existing entry.
    pub async fn store(&self, snapshot: &RateSnapshot, ttl: Duration) -> FxResult<()> {
        let key = CacheKey::for_snapshot(snapshot);
        self.snapshots.set(&key.to_string(), snapshot, Some(ttl)).await?;
        debug!(key = %key, rates = snapshot.len(), "Stored snapshot");
        Ok(())
    }

    /// Store an upstream result according to what was requested.
    ///
    /// No targets requested: the whole snapshot goes under the base's ALL key. One or
    /// more targets: one single-pair snapshot per target.
    pub async fn store_fetched(
        &self,
        requested: &[CurrencyCode],
        snapshot: &RateSnapshot,
    ) -> FxResult<()> {
        let ttl = self.config.ttl;

        if requested.is_empty() {
            let key = CacheKey::all(snapshot.base());
            self.snapshots.set(&key.to_string(), snapshot, Some(ttl)).await?;
            debug!(key = %key, rates = snapshot.len(), "Stored broad snapshot");
            return Ok(());
        }

        for part in snapshot.split() {
            self.store(&part, ttl).await?;
        }
        Ok(())
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            exact_hits: self.counters.exact.load(Ordering::Relaxed),
            reciprocal_hits: self.counters.reciprocal.load(Ordering::Relaxed),
            target_broad_hits: self.counters.target_broad.load(Ordering::Relaxed),
            base_broad_hits: self.counters.base_broad.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }

    async fn get(&self, key: &CacheKey) -> FxResult<Option<RateSnapshot>> {
        Ok(self.snapshots.get(&key.to_string()).await?)
    }

    fn record(&self, kind: HitKind) {
        let counter = match kind {
            HitKind::Exact => &self.counters.exact,
            HitKind::Reciprocal => &self.counters.reciprocal,
            HitKind::TargetBroad => &self.counters.target_broad,
            HitKind::BaseBroad => &self.counters.base_broad,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn inconsistent(key: &CacheKey, missing: &CurrencyCode) -> ValidationError {
    ValidationError::InconsistentCache {
        key: key.to_string(),
        missing: missing.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FxError;
    use chrono::{DateTime, Utc};
    use fxgate_common::MockClock;
    use fxgate_store::MemoryStore;
    use std::collections::HashMap;

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn code(c: &str) -> CurrencyCode {
        CurrencyCode::parse(c).unwrap()
    }

    fn pair(base: &str, target: &str, rate: f64) -> RateSnapshot {
        RateSnapshot::single(code(base), code(target), rate, ts()).unwrap()
    }

    fn broad(base: &str, rates: &[(&str, f64)]) -> RateSnapshot {
        let rates: HashMap<_, _> = rates.iter().map(|(c, r)| (code(c), *r)).collect();
        RateSnapshot::new(code(base), rates, ts()).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, RateCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = RateCache::new(store.clone());
        (store, cache)
    }

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_cache_key_format() {
        assert_eq!(CacheKey::pair(&code("USD"), &code("EUR")).to_string(), "rates:USD:EUR");
        assert_eq!(CacheKey::all(&code("USD")).to_string(), "rates:USD");
    }

    #[tokio::test]
    async fn test_exact_hit() {
        let (_, cache) = setup();
        cache.store(&pair("USD", "EUR", 0.9), TTL).await.unwrap();

        let hit = cache.lookup(&code("USD"), Some(&code("EUR"))).await.unwrap().unwrap();

        assert_eq!(hit.rate(&code("EUR")), Some(0.9));
        assert_eq!(cache.stats().exact_hits, 1);
    }

    #[tokio::test]
    async fn test_cache_miss_checks_four_keys() {
        let (store, cache) = setup();

        let result = cache.lookup(&code("USD"), Some(&code("EUR"))).await.unwrap();

        assert!(result.is_none());
        assert_eq!(store.read_count(), 4);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_all_lookup_checks_only_broad_key() {
        let (store, cache) = setup();
        cache.store(&pair("USD", "EUR", 0.9), TTL).await.unwrap();

        let result = cache.lookup(&code("USD"), None).await.unwrap();

        assert!(result.is_none());
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_reciprocal_hit() {
        let (_, cache) = setup();
        cache.store(&pair("USD", "EUR", 0.9), TTL).await.unwrap();

        let hit = cache.lookup(&code("EUR"), Some(&code("USD"))).await.unwrap().unwrap();

        assert_eq!(hit.base(), &code("EUR"));
        assert_eq!(hit.rate(&code("USD")), Some(1.0 / 0.9));
        assert_eq!(hit.timestamp(), ts());
        assert_eq!(cache.stats().reciprocal_hits, 1);
    }

    #[tokio::test]
    async fn test_derived_hit_is_not_restored() {
        let (store, cache) = setup();
        cache.store(&pair("USD", "EUR", 0.9), TTL).await.unwrap();

        cache.lookup(&code("EUR"), Some(&code("USD"))).await.unwrap().unwrap();

        assert!(!store.contains_key("rates:EUR:USD"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_exact_takes_precedence_over_reciprocal() {
        let (_, cache) = setup();
        cache.store(&pair("USD", "EUR", 0.9), TTL).await.unwrap();
        cache.store(&pair("EUR", "USD", 1.5), TTL).await.unwrap();

        let hit = cache.lookup(&code("USD"), Some(&code("EUR"))).await.unwrap().unwrap();

        assert_eq!(hit.rate(&code("EUR")), Some(0.9));
    }

    #[tokio::test]
    async fn test_target_broad_hit() {
        let (_, cache) = setup();
        cache
            .store(&broad("EUR", &[("USD", 1.1), ("GBP", 0.85)]), TTL)
            .await
            .unwrap();

        let hit = cache.lookup(&code("GBP"), Some(&code("EUR"))).await.unwrap().unwrap();

        assert_eq!(hit.base(), &code("GBP"));
        assert_eq!(hit.rate(&code("EUR")), Some(1.0 / 0.85));
        assert_eq!(cache.stats().target_broad_hits, 1);
    }

    #[tokio::test]
    async fn test_base_broad_hit() {
        let (_, cache) = setup();
        cache
            .store(&broad("USD", &[("EUR", 0.9), ("GBP", 0.8)]), TTL)
            .await
            .unwrap();

        let hit = cache.lookup(&code("USD"), Some(&code("GBP"))).await.unwrap().unwrap();

        assert_eq!(hit.len(), 1);
        assert_eq!(hit.rate(&code("GBP")), Some(0.8));
        assert_eq!(cache.stats().base_broad_hits, 1);
    }

    #[tokio::test]
    async fn test_target_broad_preferred_over_base_broad() {
        let (_, cache) = setup();
        cache.store(&broad("USD", &[("EUR", 0.9), ("GBP", 0.8)]), TTL).await.unwrap();
        cache.store(&broad("EUR", &[("USD", 1.25), ("GBP", 0.85)]), TTL).await.unwrap();

        let hit = cache.lookup(&code("USD"), Some(&code("EUR"))).await.unwrap().unwrap();

        assert_eq!(hit.rate(&code("EUR")), Some(1.0 / 1.25));
    }

    #[tokio::test]
    async fn test_broad_snapshot_missing_currency_is_inconsistent() {
        let (_, cache) = setup();
        cache.store(&broad("USD", &[("EUR", 0.9), ("GBP", 0.8)]), TTL).await.unwrap();

        let result = cache.lookup(&code("USD"), Some(&code("JPY"))).await;

        assert!(matches!(
            result,
            Err(FxError::Validation(ValidationError::InconsistentCache { .. }))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_shared_entry_is_an_error() {
        let (store, cache) = setup();
        let raw = br#"{"base":"USD","rates":{"USD":1.0,"EUR":-2.0},"timestamp":"2023-11-14T22:13:20Z"}"#;
        store.set("rates:USD", raw.to_vec(), None).await.unwrap();

        let result = cache.lookup(&code("USD"), None).await;

        assert!(matches!(
            result,
            Err(FxError::Store(fxgate_store::StoreError::Serialization { .. }))
        ));
    }

    #[tokio::test]
    async fn test_target_broad_missing_base_is_inconsistent() {
        let (_, cache) = setup();
        cache.store(&broad("EUR", &[("GBP", 0.85), ("JPY", 160.0)]), TTL).await.unwrap();

        let result = cache.lookup(&code("USD"), Some(&code("EUR"))).await;

        assert!(matches!(
            result,
            Err(FxError::Validation(ValidationError::InconsistentCache { .. }))
        ));
    }

    #[tokio::test]
    async fn test_same_currency_rejected() {
        let (store, cache) = setup();

        let result = cache.lookup(&code("USD"), Some(&code("USD"))).await;

        assert!(matches!(
            result,
            Err(FxError::Validation(ValidationError::SameCurrency(_)))
        ));
        assert_eq!(store.read_count(), 0);
    }

    #[tokio::test]
    async fn test_store_is_idempotent() {
        let (store, cache) = setup();
        let snapshot = pair("USD", "EUR", 0.9);

        cache.store(&snapshot, TTL).await.unwrap();
        let first = cache.lookup(&code("USD"), Some(&code("EUR"))).await.unwrap();
        cache.store(&snapshot, TTL).await.unwrap();
        let second = cache.lookup(&code("USD"), Some(&code("EUR"))).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_store_fetched_splits_targets() {
        let (store, cache) = setup();
        let fetched = broad("USD", &[("EUR", 0.9), ("GBP", 0.8), ("JPY", 150.0)]);

        cache
            .store_fetched(&[code("EUR"), code("GBP"), code("JPY")], &fetched)
            .await
            .unwrap();

        assert_eq!(store.len(), 3);
        assert!(store.contains_key("rates:USD:EUR"));
        assert!(store.contains_key("rates:USD:GBP"));
        assert!(store.contains_key("rates:USD:JPY"));
        assert!(!store.contains_key("rates:USD"));
    }

    #[tokio::test]
    async fn test_store_fetched_without_targets_is_broad() {
        let (store, cache) = setup();
        let fetched = broad("USD", &[("EUR", 0.9)]);

        cache.store_fetched(&[], &fetched).await.unwrap();

        assert!(store.contains_key("rates:USD"));
        assert!(!store.contains_key("rates:USD:EUR"));
        let all = cache.lookup(&code("USD"), None).await.unwrap().unwrap();
        assert_eq!(all, fetched);
    }

    #[tokio::test]
    async fn test_expired_snapshot_not_returned() {
        let clock = MockClock::at_epoch(1_700_000_000);
        let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
        let cache = RateCache::new(store);
        cache.store(&pair("USD", "EUR", 0.9), TTL).await.unwrap();

        clock.advance(chrono::Duration::seconds(61));

        assert!(cache.lookup(&code("USD"), Some(&code("EUR"))).await.unwrap().is_none());
        assert!(cache.lookup(&code("EUR"), Some(&code("USD"))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reciprocal_agreement() {
        let (_, cache) = setup();
        let rate = 0.9137;
        cache.store(&pair("USD", "CHF", rate), TTL).await.unwrap();

        let derived = cache
            .lookup(&code("CHF"), Some(&code("USD")))
            .await
            .unwrap()
            .unwrap()
            .rate(&code("USD"))
            .unwrap();
        cache.store(&pair("CHF", "USD", derived), TTL).await.unwrap();
        let forward = cache
            .lookup(&code("USD"), Some(&code("CHF")))
            .await
            .unwrap()
            .unwrap()
            .rate(&code("CHF"))
            .unwrap();

        assert!((forward * derived - 1.0).abs() < 1e-12);
    }
}
