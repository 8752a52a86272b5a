//! exchangerate.host client.
//!
//! Implements both upstream ports. The API answers `200 OK` even for failed
//! requests and reports the failure through `success: false` plus an error object,
//! so both the HTTP status and the payload envelope are checked.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fxgate_common::{CurrencyCode, RateSnapshot, UpstreamError};
use fxgate_fx::{CurrencyCatalog, RateProvider};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct LiveResponse {
    success: bool,
    timestamp: Option<i64>,
    source: Option<String>,
    #[serde(default)]
    quotes: HashMap<String, f64>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    success: bool,
    #[serde(default)]
    currencies: HashMap<String, String>,
    error: Option<ApiError>,
}

fn check_envelope(success: bool, error: Option<ApiError>) -> Result<(), UpstreamError> {
    if success {
        return Ok(());
    }
    Err(match error {
        Some(e) => UpstreamError::Api {
            code: e.code,
            info: e.info,
        },
        None => UpstreamError::Malformed("unsuccessful response without error object".into()),
    })
}

/// HTTP client for the exchangerate.host API.
#[derive(Debug, Clone)]
pub struct ExchangeRateHostClient {
    http: Client,
    config: UpstreamConfig,
}

impl ExchangeRateHostClient {
    /// Create a new client.
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        mut query: Vec<(&'static str, String)>,
    ) -> Result<T, UpstreamError> {
        if let Some(key) = &self.config.api_key {
            query.push(("access_key", key.clone()));
        }
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint);
        debug!(url = %url, "Upstream request");

        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let info = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), endpoint, "Upstream returned error status");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                info,
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        serde_json::from_slice(&body).map_err(|e| UpstreamError::Malformed(e.to_string()))
    }

    fn classify(&self, error: reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            UpstreamError::Timeout(self.config.timeout)
        } else {
            UpstreamError::Transport(error.to_string())
        }
    }
}

/// Turn `{"USDEUR": 0.9}` into `{EUR: 0.9}` for source `USD`.
fn strip_source(
    source: &CurrencyCode,
    quotes: HashMap<String, f64>,
) -> Result<HashMap<CurrencyCode, f64>, UpstreamError> {
    let mut rates = HashMap::with_capacity(quotes.len());
    for (pair, rate) in quotes {
        let target = pair
            .strip_prefix(source.code())
            .ok_or_else(|| UpstreamError::Malformed(format!("quote {pair} is not from {source}")))?;
        let target = CurrencyCode::parse(target)
            .map_err(|e| UpstreamError::Malformed(e.to_string()))?;
        if &target != source {
            rates.insert(target, rate);
        }
    }
    Ok(rates)
}

#[async_trait]
impl RateProvider for ExchangeRateHostClient {
    fn name(&self) -> &str {
        "exchangerate.host"
    }

    async fn fetch_rates(
        &self,
        base: &CurrencyCode,
        targets: &[CurrencyCode],
    ) -> Result<RateSnapshot, UpstreamError> {
        let mut query = vec![("source", base.to_string())];
        if !targets.is_empty() {
            let joined = targets
                .iter()
                .map(CurrencyCode::code)
                .collect::<Vec<_>>()
                .join(",");
            query.push(("currencies", joined));
        }

        let response: LiveResponse = self.get("live", query).await?;
        check_envelope(response.success, response.error)?;

        if let Some(source) = &response.source {
            if !source.eq_ignore_ascii_case(base.code()) {
                return Err(UpstreamError::Malformed(format!(
                    "asked for source {base}, got {source}"
                )));
            }
        }

        let rates = strip_source(base, response.quotes)?;
        let timestamp = response
            .timestamp
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        RateSnapshot::new(base.clone(), rates, timestamp)
            .map_err(|e| UpstreamError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl CurrencyCatalog for ExchangeRateHostClient {
    async fn fetch_available_currencies(&self) -> Result<BTreeSet<CurrencyCode>, UpstreamError> {
        let response: ListResponse = self.get("list", Vec::new()).await?;
        check_envelope(response.success, response.error)?;

        let currencies: BTreeSet<CurrencyCode> = response
            .currencies
            .keys()
            .filter_map(|code| CurrencyCode::parse(code).ok())
            .collect();

        if currencies.is_empty() {
            return Err(UpstreamError::Malformed("empty currency list".into()));
        }
        Ok(currencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ExchangeRateHostClient {
        ExchangeRateHostClient::new(UpstreamConfig {
            base_url: server.uri(),
            api_key: Some("test-key".to_string()),
            timeout: Duration::from_millis(500),
        })
        .unwrap()
    }

    fn code(c: &str) -> CurrencyCode {
        CurrencyCode::parse(c).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_rates_strips_source_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live"))
            .and(query_param("access_key", "test-key"))
            .and(query_param("source", "USD"))
            .and(query_param("currencies", "EUR,GBP"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"success":true,"timestamp":1700000000,"source":"USD",
                    "quotes":{"USDEUR":0.9,"USDGBP":0.8}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = client(&server)
            .fetch_rates(&code("USD"), &[code("EUR"), code("GBP")])
            .await
            .unwrap();

        assert_eq!(snapshot.base(), &code("USD"));
        assert_eq!(snapshot.rate(&code("EUR")), Some(0.9));
        assert_eq!(snapshot.rate(&code("GBP")), Some(0.8));
        assert_eq!(snapshot.timestamp().timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_fetch_all_rates_drops_self_quote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"success":true,"timestamp":1700000000,"source":"EUR",
                    "quotes":{"EUREUR":1.0,"EURUSD":1.1}}"#,
            ))
            .mount(&server)
            .await;

        let snapshot = client(&server).fetch_rates(&code("EUR"), &[]).await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.rate(&code("USD")), Some(1.1));
    }

    #[tokio::test]
    async fn test_api_error_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"success":false,"error":{"code":101,"info":"invalid access key"}}"#,
            ))
            .mount(&server)
            .await;

        let result = client(&server).fetch_rates(&code("USD"), &[code("EUR")]).await;

        match result {
            Err(UpstreamError::Api { code, info }) => {
                assert_eq!(code, 101);
                assert_eq!(info, "invalid access key");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let result = client(&server).fetch_available_currencies().await;

        assert_eq!(
            result,
            Err(UpstreamError::Status {
                status: 503,
                info: "maintenance".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = client(&server).fetch_rates(&code("USD"), &[code("EUR")]).await;

        assert!(matches!(result, Err(UpstreamError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"success":true,"currencies":{"USD":"US Dollar"}}"#)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let result = client(&server).fetch_available_currencies().await;

        assert!(matches!(result, Err(UpstreamError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_fetch_available_currencies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list"))
            .and(query_param("access_key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"success":true,"currencies":{"USD":"US Dollar","EUR":"Euro"}}"#,
            ))
            .mount(&server)
            .await;

        let currencies = client(&server).fetch_available_currencies().await.unwrap();

        assert_eq!(currencies.len(), 2);
        assert!(currencies.contains(&code("EUR")));
    }

    #[test]
    fn test_strip_source_rejects_foreign_quote() {
        let quotes = HashMap::from([("GBPEUR".to_string(), 1.1)]);
        assert!(matches!(
            strip_source(&code("USD"), quotes),
            Err(UpstreamError::Malformed(_))
        ));
    }
}
