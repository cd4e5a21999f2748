//! ExchangeRate-API fiat source.
//!
//! `GET {url}/{api_key}/latest/{BASE}` returns
//! `{"result": "success", "conversion_rates": {"EUR": 0.92, ...}}`.
//! Older API versions name the map `rates`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use valutatrade_common::PairKey;

use crate::config::ExchangeRateApiConfig;
use crate::error::{RatesError, RatesResult};
use crate::source::{accept_rate, fetch_json, RateSource};
use crate::store::RateMap;

pub const EXCHANGERATE_API: &str = "ExchangeRate-API";

/// Fiat rate source backed by ExchangeRate-API.
pub struct ExchangeRateApiSource {
    client: Client,
    config: ExchangeRateApiConfig,
}

impl ExchangeRateApiSource {
    pub fn new(config: ExchangeRateApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn api_key(&self) -> RatesResult<&str> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                RatesError::source_unavailable(EXCHANGERATE_API, "EXCHANGERATE_API_KEY is not set")
            })
    }

    /// Validate the status field and extract `FIAT_BASE` pairs for the
    /// configured currencies.
    pub fn parse_rates(&self, body: &Value) -> RatesResult<RateMap> {
        let result = body.get("result").and_then(Value::as_str);
        if result != Some("success") {
            let reason = match body.get("error-type").and_then(Value::as_str) {
                Some(error_type) => format!("result {} ({})", result.unwrap_or("missing"), error_type),
                None => format!("result {}", result.unwrap_or("missing")),
            };
            return Err(RatesError::source_unavailable(EXCHANGERATE_API, reason));
        }

        let non_empty = |key: &str| {
            body.get(key)
                .and_then(Value::as_object)
                .filter(|map| !map.is_empty())
        };
        let Some(table) = non_empty("rates").or_else(|| non_empty("conversion_rates")) else {
            return Ok(RateMap::new());
        };

        let mut rates = RateMap::new();
        for code in &self.config.currencies {
            let Some(value) = table.get(code.as_str()) else {
                debug!(currency = %code, "No rate in ExchangeRate-API response");
                continue;
            };

            let pair = PairKey::new(code.clone(), self.config.base_currency.clone());
            if let Some(rate) = accept_rate(EXCHANGERATE_API, &pair, value) {
                rates.insert(pair, rate);
            }
        }

        Ok(rates)
    }
}

#[async_trait]
impl RateSource for ExchangeRateApiSource {
    fn name(&self) -> &str {
        EXCHANGERATE_API
    }

    async fn fetch_rates(&self) -> RatesResult<RateMap> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}/{}/latest/{}",
            self.config.url.trim_end_matches('/'),
            api_key,
            self.config.base_currency
        );

        let request = self.client.get(url).timeout(self.config.timeout);
        let body = fetch_json(EXCHANGERATE_API, request).await?;

        self.parse_rates(&body)
    }
}
