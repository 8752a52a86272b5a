//! FxGate FX core
//!
//! Exchange-rate lookup and currency conversion over a shared cache.
//!
//! # Features
//!
//! - Shared rate cache with cross-pair derivation (reciprocal and broad entries)
//! - Lazily populated currency registry with single-flight population
//! - Conversion into several targets with one upstream call for all cache misses
//!
//! # Example
//!
//! ```rust,ignore
//! use fxgate_fx::{ConversionEngine, ConversionRequest, EngineConfig};
//!
//! let engine = ConversionEngine::new(store, provider, catalog, EngineConfig::default());
//!
//! let rate = engine.rates("USD", Some("EUR")).await?;
//! let conversion = engine
//!     .convert(ConversionRequest::new("USD", vec!["EUR", "GBP"], 100.0))
//!     .await?;
//! ```

pub mod cache;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod provider;
pub mod registry;

pub use cache::{CacheKey, CacheStats, RateCache, RateCacheConfig};
pub use conversion::{Conversion, ConversionRequest};
pub use engine::{ConversionEngine, EngineConfig, EngineStats};
pub use error::{FxError, FxResult};
pub use provider::{CurrencyCatalog, RateProvider};
pub use registry::{CurrencyRegistry, CurrencySet, RegistryConfig, CATALOG_KEY};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::{MockCatalog, MockRateProvider};
