//! Rate source trait and shared client plumbing.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;
use valutatrade_common::PairKey;

use crate::coingecko::CoinGeckoSource;
use crate::config::ParserConfig;
use crate::error::{RatesError, RatesResult};
use crate::exchangerate_api::ExchangeRateApiSource;
use crate::store::RateMap;

/// An external price provider.
///
/// A fetch either returns the subset of pairs it could parse, or fails with
/// [`RatesError::SourceUnavailable`]. Sources never retry.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name used for attribution.
    fn name(&self) -> &str;

    /// Fetch the current rates, each priced against the source's base currency.
    async fn fetch_rates(&self) -> RatesResult<RateMap>;
}

/// Shared source handle.
pub type SharedRateSource = Arc<dyn RateSource>;

/// Built-in source variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    CoinGecko,
    ExchangeRateApi,
}

impl SourceKind {
    /// All variants in default query order.
    pub const ALL: [SourceKind; 2] = [SourceKind::CoinGecko, SourceKind::ExchangeRateApi];

    /// Display name, also used as the source attribution.
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::CoinGecko => "CoinGecko",
            SourceKind::ExchangeRateApi => "ExchangeRate-API",
        }
    }

    fn build(&self, config: &ParserConfig) -> SharedRateSource {
        match self {
            SourceKind::CoinGecko => Arc::new(CoinGeckoSource::new(config.coingecko())),
            SourceKind::ExchangeRateApi => {
                Arc::new(ExchangeRateApiSource::new(config.exchangerate()))
            }
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceKind {
    type Err = RatesError;

    fn from_str(s: &str) -> RatesResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "coingecko" => Ok(SourceKind::CoinGecko),
            "exchangerate" | "exchangerate-api" => Ok(SourceKind::ExchangeRateApi),
            other => Err(RatesError::Configuration(format!(
                "Unknown rate source '{}', expected coingecko or exchangerate",
                other
            ))),
        }
    }
}

/// Build the ordered source list: every source, or only `selection`.
///
/// Order matters: when two sources report the same pair, the later one wins.
pub fn build_sources(config: &ParserConfig, selection: Option<SourceKind>) -> Vec<SharedRateSource> {
    match selection {
        Some(kind) => vec![kind.build(config)],
        None => SourceKind::ALL.iter().map(|kind| kind.build(config)).collect(),
    }
}

/// Read a JSON number or numeric string as a decimal.
pub(crate) fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Keep a parsed rate only if it is strictly positive.
pub(crate) fn accept_rate(provider: &str, pair: &PairKey, value: &Value) -> Option<Decimal> {
    let rate = decimal_from_json(value)?;
    if rate <= Decimal::ZERO {
        warn!(source = provider, pair = %pair, rate = %rate, "Skipping non-positive rate");
        return None;
    }
    Some(rate)
}

/// Send a request and decode a JSON body, mapping every failure to
/// [`RatesError::SourceUnavailable`].
pub(crate) async fn fetch_json(provider: &str, request: reqwest::RequestBuilder) -> RatesResult<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RatesError::source_unavailable(
            provider,
            format!("HTTP {}", status.as_u16()),
        ));
    }

    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, e))?;

    serde_json::from_str(&body)
        .map_err(|e| RatesError::source_unavailable(provider, format!("malformed JSON: {}", e)))
}

// URLs can embed credentials, so they are stripped from the reason.
fn transport_error(provider: &str, err: reqwest::Error) -> RatesError {
    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        format!("network error: {}", err.without_url())
    };
    RatesError::source_unavailable(provider, reason)
}

/// Mock rate source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateSource {
    name: String,
    rates: dashmap::DashMap<PairKey, Decimal>,
    failure: Option<String>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateSource {
    /// Create a new mock source with no rates.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: dashmap::DashMap::new(),
            failure: None,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Create a mock source whose every fetch fails with `reason`.
    pub fn failing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::new(name)
        }
    }

    /// Set a rate for a `FROM_TO` pair.
    pub fn set_rate(&self, pair: &str, rate: Decimal) {
        if let Ok(pair) = pair.parse::<PairKey>() {
            self.rates.insert(pair, rate);
        }
    }

    /// Builder form of [`MockRateSource::set_rate`].
    pub fn with_rate(self, pair: &str, rate: Decimal) -> Self {
        self.set_rate(pair, rate);
        self
    }

    /// Number of fetches so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for MockRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self) -> RatesResult<RateMap> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        if let Some(reason) = &self.failure {
            return Err(RatesError::source_unavailable(&self.name, reason));
        }

        Ok(self
            .rates
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_decimal_from_json() {
        assert_eq!(decimal_from_json(&json!(65000.12)), Some(dec!(65000.12)));
        assert_eq!(decimal_from_json(&json!(92)), Some(dec!(92)));
        assert_eq!(decimal_from_json(&json!("0.92")), Some(dec!(0.92)));
        assert_eq!(decimal_from_json(&json!(1e-7)), Some(dec!(0.0000001)));
        assert_eq!(decimal_from_json(&json!("n/a")), None);
        assert_eq!(decimal_from_json(&json!(null)), None);
        assert_eq!(decimal_from_json(&json!({"usd": 1})), None);
    }

    #[test]
    fn test_accept_rate_rejects_non_positive() {
        let pair: PairKey = "BTC_USD".parse().unwrap();

        assert_eq!(accept_rate("test", &pair, &json!(0)), None);
        assert_eq!(accept_rate("test", &pair, &json!(-1.5)), None);
        assert_eq!(accept_rate("test", &pair, &json!(2.5)), Some(dec!(2.5)));
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("coingecko".parse::<SourceKind>().unwrap(), SourceKind::CoinGecko);
        assert_eq!("ExchangeRate".parse::<SourceKind>().unwrap(), SourceKind::ExchangeRateApi);
        assert!("kraken".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_build_sources_order() {
        let config = ParserConfig::default();

        let all = build_sources(&config, None);
        let names: Vec<&str> = all.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["CoinGecko", "ExchangeRate-API"]);

        let only = build_sources(&config, Some(SourceKind::ExchangeRateApi));
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].name(), "ExchangeRate-API");
    }

    #[tokio::test]
    async fn test_mock_source() {
        let source = MockRateSource::new("test").with_rate("BTC_USD", dec!(65000));

        let rates = source.fetch_rates().await.unwrap();

        assert_eq!(rates.len(), 1);
        assert_eq!(rates[&"BTC_USD".parse::<PairKey>().unwrap()], dec!(65000));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_mock_source() {
        let source = MockRateSource::failing("broken", "HTTP 503");

        let result = source.fetch_rates().await;

        assert!(matches!(
            result,
            Err(RatesError::SourceUnavailable { ref provider, .. }) if provider == "broken"
        ));
    }
}
