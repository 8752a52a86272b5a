//! Lazily populated registry of recognized currency codes.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use fxgate_common::{default_catalog_ttl, CurrencyCode, UpstreamError, ValidationError};
use fxgate_store::{SharedStore, TypedCache};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::FxResult;
use crate::provider::CurrencyCatalog;

/// Shared-cache key of the frozen currency set.
pub const CATALOG_KEY: &str = "available:currencies";

/// The frozen set of recognized currency codes.
pub type CurrencySet = BTreeSet<CurrencyCode>;

/// Configuration for the currency registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// TTL of the catalog copy written to the shared cache.
    pub catalog_ttl: Duration,
    /// Upper bound on the upstream catalog fetch.
    pub fetch_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            catalog_ttl: default_catalog_ttl(),
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Where the in-memory set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    SharedCache,
    Upstream,
}

/// Registry of currency codes, populated once from the shared cache or upstream.
///
/// Population is single-flight: concurrent first callers wait on one population
/// attempt. A failed attempt leaves the registry unpopulated and is retried by the
/// next caller. Once populated, reads take no lock.
pub struct CurrencyRegistry {
    currencies: OnceCell<Arc<CurrencySet>>,
    shared: TypedCache<CurrencySet>,
    catalog: Arc<dyn CurrencyCatalog>,
    config: RegistryConfig,
}

impl CurrencyRegistry {
    /// Create a registry with default configuration.
    pub fn new(store: Arc<dyn SharedStore>, catalog: Arc<dyn CurrencyCatalog>) -> Self {
        Self::with_config(store, catalog, RegistryConfig::default())
    }

    /// Create a registry with custom configuration.
    pub fn with_config(
        store: Arc<dyn SharedStore>,
        catalog: Arc<dyn CurrencyCatalog>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            currencies: OnceCell::new(),
            shared: TypedCache::new(store),
            catalog,
            config,
        }
    }

    /// Whether `code` is a recognized currency. Blank codes are never members.
    pub async fn exists(&self, code: &str) -> FxResult<bool> {
        let Some(code) = normalize(code) else {
            return Ok(false);
        };
        Ok(self.currency_set().await?.contains(&code))
    }

    /// Whether at least one of `codes` is recognized. An empty list is `false`.
    pub async fn any_exists<S: AsRef<str>>(&self, codes: &[S]) -> FxResult<bool> {
        if codes.is_empty() {
            return Ok(false);
        }

        let set = self.currency_set().await?;
        Ok(codes
            .iter()
            .filter_map(|c| normalize(c.as_ref()))
            .any(|c| set.contains(&c)))
    }

    /// Fail with `UnknownCurrency` on the first code that is not recognized.
    pub async fn validate<'a, I>(&self, codes: I) -> FxResult<()>
    where
        I: IntoIterator<Item = &'a CurrencyCode>,
    {
        let set = self.currency_set().await?;
        match codes.into_iter().find(|c| !set.contains(*c)) {
            Some(unknown) => Err(ValidationError::UnknownCurrency(unknown.clone()).into()),
            None => Ok(()),
        }
    }

    /// Whether the in-memory set is populated.
    pub fn is_populated(&self) -> bool {
        self.currencies.initialized()
    }

    /// The frozen set, populating it on first use.
    pub async fn currency_set(&self) -> FxResult<Arc<CurrencySet>> {
        if let Some(set) = self.currencies.get() {
            return Ok(Arc::clone(set));
        }

        let set = self
            .currencies
            .get_or_try_init(|| async {
                let (set, source) = self.populate().await?;
                info!(count = set.len(), source = ?source, "Currency registry populated");
                Ok::<_, crate::error::FxError>(Arc::new(set))
            })
            .await?;
        Ok(Arc::clone(set))
    }

    async fn populate(&self) -> FxResult<(CurrencySet, CatalogSource)> {
        if let Some(cached) = self.shared.get(CATALOG_KEY).await? {
            if !cached.is_empty() {
                return Ok((cached, CatalogSource::SharedCache));
            }
            debug!("Shared catalog copy is empty, refetching");
        }

        let bound = self.config.fetch_timeout;
        let fetched = tokio::time::timeout(bound, self.catalog.fetch_available_currencies())
            .await
            .map_err(|_| UpstreamError::Timeout(bound))??;
        self.shared
            .set(CATALOG_KEY, &fetched, Some(self.config.catalog_ttl))
            .await?;

        Ok((fetched, CatalogSource::Upstream))
    }
}

fn normalize(code: &str) -> Option<CurrencyCode> {
    if code.trim().is_empty() {
        return None;
    }
    CurrencyCode::parse(code).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FxError;
    use crate::provider::MockCatalog;
    use fxgate_store::MemoryStore;

    fn setup(codes: &[&str]) -> (Arc<MemoryStore>, Arc<MockCatalog>, CurrencyRegistry) {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(MockCatalog::new(codes));
        let registry = CurrencyRegistry::new(store.clone(), catalog.clone());
        (store, catalog, registry)
    }

    #[tokio::test]
    async fn test_exists() {
        let (_, _, registry) = setup(&["USD", "EUR"]);

        assert!(registry.exists("USD").await.unwrap());
        assert!(registry.exists("eur").await.unwrap());
        assert!(!registry.exists("GBP").await.unwrap());
        assert!(!registry.exists("not-a-code").await.unwrap());
    }

    #[tokio::test]
    async fn test_blank_code_skips_population() {
        let (_, catalog, registry) = setup(&["USD"]);

        assert!(!registry.exists("").await.unwrap());
        assert!(!registry.exists("   ").await.unwrap());
        assert!(!registry.is_populated());
        assert_eq!(catalog.calls(), 0);
    }

    #[tokio::test]
    async fn test_any_exists() {
        let (_, catalog, registry) = setup(&["USD", "EUR"]);

        assert!(!registry.any_exists::<&str>(&[]).await.unwrap());
        assert_eq!(catalog.calls(), 0);

        assert!(registry.any_exists(&["USD", "GBP"]).await.unwrap());
        assert!(!registry.any_exists(&["GBP", "JPY"]).await.unwrap());
    }

    #[tokio::test]
    async fn test_validate_names_unknown_code() {
        let (_, _, registry) = setup(&["USD", "EUR"]);
        let codes = [CurrencyCode::usd(), CurrencyCode::gbp()];

        let result = registry.validate(codes.iter()).await;

        match result {
            Err(FxError::Validation(ValidationError::UnknownCurrency(code))) => {
                assert_eq!(code, CurrencyCode::gbp())
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_populates_from_upstream_and_persists() {
        let (store, catalog, registry) = setup(&["USD", "EUR"]);

        registry.exists("USD").await.unwrap();
        registry.exists("EUR").await.unwrap();

        assert_eq!(catalog.calls(), 1);
        assert!(store.contains_key(CATALOG_KEY));
    }

    #[tokio::test]
    async fn test_prefers_shared_cache_over_upstream() {
        let store = Arc::new(MemoryStore::new());
        let shared: TypedCache<CurrencySet> = TypedCache::new(store.clone());
        let cached: CurrencySet = [CurrencyCode::gbp()].into_iter().collect();
        shared.set(CATALOG_KEY, &cached, None).await.unwrap();

        let catalog = Arc::new(MockCatalog::new(&["USD"]));
        let registry = CurrencyRegistry::new(store, catalog.clone());

        assert!(registry.exists("GBP").await.unwrap());
        assert!(!registry.exists("USD").await.unwrap());
        assert_eq!(catalog.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_population_is_retried() {
        let (_, catalog, registry) = setup(&["USD"]);
        catalog.fail_next(1);

        let first = registry.exists("USD").await;
        assert!(matches!(first, Err(FxError::Upstream(_))));
        assert!(!registry.is_populated());

        assert!(registry.exists("USD").await.unwrap());
        assert_eq!(catalog.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_catalog_times_out() {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(MockCatalog::new(&["USD"]));
        catalog.set_delay(Duration::from_secs(600));
        let registry = CurrencyRegistry::with_config(
            store.clone(),
            catalog.clone(),
            RegistryConfig {
                fetch_timeout: Duration::from_secs(2),
                ..Default::default()
            },
        );

        let started = tokio::time::Instant::now();
        let result = registry.exists("USD").await;

        assert!(matches!(
            result,
            Err(FxError::Upstream(UpstreamError::Timeout(_)))
        ));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!registry.is_populated());
        assert!(!store.contains_key(CATALOG_KEY));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_first_access_fetches_once() {
        let (_, catalog, registry) = setup(&["USD", "EUR"]);
        catalog.set_delay(Duration::from_millis(50));
        let registry = Arc::new(registry);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move { registry.exists("EUR").await }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }
        assert_eq!(catalog.calls(), 1);
    }
}
