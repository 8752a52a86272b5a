//! Upstream provider ports.

use std::collections::BTreeSet;

use async_trait::async_trait;
use fxgate_common::{CurrencyCode, RateSnapshot, UpstreamError};

/// Upstream source of exchange rates.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch rates from `base` to each of `targets`.
    ///
    /// An empty `targets` slice asks for every currency the provider quotes against
    /// `base`.
    async fn fetch_rates(
        &self,
        base: &CurrencyCode,
        targets: &[CurrencyCode],
    ) -> Result<RateSnapshot, UpstreamError>;
}

/// Upstream list of supported currency codes.
#[async_trait]
pub trait CurrencyCatalog: Send + Sync {
    /// Fetch the full set of currency codes the upstream supports.
    async fn fetch_available_currencies(&self) -> Result<BTreeSet<CurrencyCode>, UpstreamError>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockCatalog, MockRateProvider};

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;

    /// Mock rate provider for testing.
    ///
    /// Counts calls and records the targets of every fetch.
    pub struct MockRateProvider {
        name: String,
        quotes: Mutex<HashMap<CurrencyCode, HashMap<CurrencyCode, f64>>>,
        timestamp: DateTime<Utc>,
        failure: Mutex<Option<UpstreamError>>,
        delay: Mutex<Option<Duration>>,
        calls: AtomicUsize,
        requests: Mutex<Vec<(CurrencyCode, Vec<CurrencyCode>)>>,
    }

    impl MockRateProvider {
        /// Create a new mock provider whose snapshots carry `timestamp`.
        pub fn new(name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
            Self {
                name: name.into(),
                quotes: Mutex::new(HashMap::new()),
                timestamp,
                failure: Mutex::new(None),
                delay: Mutex::new(None),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Set a quote for a currency pair.
        pub fn set_rate(&self, base: CurrencyCode, target: CurrencyCode, rate: f64) {
            self.quotes.lock().entry(base).or_default().insert(target, rate);
        }

        /// Make every subsequent fetch fail with `error`.
        pub fn fail_with(&self, error: UpstreamError) {
            *self.failure.lock() = Some(error);
        }

        /// Stop failing.
        pub fn recover(&self) {
            *self.failure.lock() = None;
        }

        /// Sleep this long inside every fetch.
        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock() = Some(delay);
        }

        /// Number of fetches attempted.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Base and targets of every fetch, in order.
        pub fn requests(&self) -> Vec<(CurrencyCode, Vec<CurrencyCode>)> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl RateProvider for MockRateProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch_rates(
            &self,
            base: &CurrencyCode,
            targets: &[CurrencyCode],
        ) -> Result<RateSnapshot, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push((base.clone(), targets.to_vec()));

            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if let Some(error) = self.failure.lock().clone() {
                return Err(error);
            }

            let quotes = self.quotes.lock();
            let all = quotes.get(base).cloned().unwrap_or_default();
            let rates = if targets.is_empty() {
                all
            } else {
                let mut picked = HashMap::new();
                for target in targets {
                    let rate = all.get(target).ok_or_else(|| UpstreamError::Api {
                        code: 202,
                        info: format!("Invalid currency {target}"),
                    })?;
                    picked.insert(target.clone(), *rate);
                }
                picked
            };

            RateSnapshot::new(base.clone(), rates, self.timestamp)
                .map_err(|e| UpstreamError::Malformed(e.to_string()))
        }
    }

    /// Mock currency catalog for testing.
    pub struct MockCatalog {
        currencies: BTreeSet<CurrencyCode>,
        delay: Mutex<Option<Duration>>,
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    impl MockCatalog {
        /// Catalog listing `codes`.
        pub fn new(codes: &[&str]) -> Self {
            Self {
                currencies: codes
                    .iter()
                    .filter_map(|c| CurrencyCode::parse(c).ok())
                    .collect(),
                delay: Mutex::new(None),
                failures_left: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }

        /// Fail the next `n` fetches with a transport error.
        pub fn fail_next(&self, n: usize) {
            self.failures_left.store(n, Ordering::SeqCst);
        }

        /// Sleep this long inside every fetch.
        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock() = Some(delay);
        }

        /// Number of fetches attempted.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CurrencyCatalog for MockCatalog {
        async fn fetch_available_currencies(
            &self,
        ) -> Result<BTreeSet<CurrencyCode>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(UpstreamError::Transport("connection refused".to_string()));
            }

            Ok(self.currencies.clone())
        }
    }
}
