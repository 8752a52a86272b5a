//! Gateway facade: admission control, then the conversion engine.

use std::sync::Arc;

use fxgate_common::RateSnapshot;
use fxgate_fx::{Conversion, ConversionEngine, ConversionRequest, CurrencyCatalog, RateProvider};
use fxgate_limiter::AdmissionLimiter;
use fxgate_store::{MemoryStore, RedisStore, SharedStore};
use serde::Serialize;
use tracing::{info, instrument};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::upstream::ExchangeRateHostClient;

/// Result of a gateway call that passed configuration and validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "result", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// The request was admitted and answered.
    Served(T),
    /// The caller exceeded its admission budget.
    Throttled,
}

impl<T> Outcome<T> {
    /// Whether the request was throttled.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Outcome::Throttled)
    }

    /// The served value, if any.
    pub fn served(self) -> Option<T> {
        match self {
            Outcome::Served(value) => Some(value),
            Outcome::Throttled => None,
        }
    }
}

/// FxGate entry point.
pub struct Gateway {
    limiter: AdmissionLimiter,
    engine: ConversionEngine,
}

impl Gateway {
    /// Assemble a gateway from its parts.
    pub fn new(limiter: AdmissionLimiter, engine: ConversionEngine) -> Self {
        Self { limiter, engine }
    }

    /// Build a gateway over `store` and the given upstream ports.
    pub fn with_ports(
        config: &GatewayConfig,
        store: Arc<dyn SharedStore>,
        provider: Arc<dyn RateProvider>,
        catalog: Arc<dyn CurrencyCatalog>,
    ) -> GatewayResult<Self> {
        config.validate().map_err(GatewayError::Config)?;

        let limiter = AdmissionLimiter::new(Arc::clone(&store), config.limiter.clone())?;
        let engine = ConversionEngine::new(store, provider, catalog, config.engine_config());
        Ok(Self::new(limiter, engine))
    }

    /// Build a gateway from configuration, connecting to Redis when configured.
    pub async fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let store: Arc<dyn SharedStore> = match &config.redis_url {
            Some(url) => {
                info!("Using Redis shared store");
                Arc::new(RedisStore::connect(url).await.map_err(fxgate_store::StoreError::from)?)
            }
            None => {
                info!("Using in-process store");
                Arc::new(MemoryStore::new())
            }
        };

        let client = Arc::new(
            ExchangeRateHostClient::new(config.upstream.clone())
                .map_err(|e| GatewayError::Config(e.to_string()))?,
        );

        Self::with_ports(config, store, client.clone(), client)
    }

    /// Rates from `base` to `target`, or to every currency.
    #[instrument(skip(self))]
    pub async fn rate(
        &self,
        identity: &str,
        base: &str,
        target: Option<&str>,
    ) -> GatewayResult<Outcome<RateSnapshot>> {
        if !self.limiter.allow(identity).await? {
            return Ok(Outcome::Throttled);
        }
        Ok(Outcome::Served(self.engine.rates(base, target).await?))
    }

    /// Convert an amount into each requested currency.
    #[instrument(skip(self, request))]
    pub async fn convert(
        &self,
        identity: &str,
        request: ConversionRequest,
    ) -> GatewayResult<Outcome<Conversion>> {
        if !self.limiter.allow(identity).await? {
            return Ok(Outcome::Throttled);
        }
        Ok(Outcome::Served(self.engine.convert(request).await?))
    }

    /// The conversion engine.
    pub fn engine(&self) -> &ConversionEngine {
        &self.engine
    }
}
