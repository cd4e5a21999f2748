//! CoinGecko crypto price source.
//!
//! Queries the simple price endpoint for a fixed set of asset ids against one
//! quote currency. Response shape: `{"bitcoin": {"usd": 65000.12}, ...}`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use valutatrade_common::PairKey;

use crate::config::CoinGeckoConfig;
use crate::error::RatesResult;
use crate::source::{accept_rate, fetch_json, RateSource};
use crate::store::RateMap;

pub const COINGECKO: &str = "CoinGecko";

/// Crypto price source backed by CoinGecko.
pub struct CoinGeckoSource {
    client: Client,
    config: CoinGeckoConfig,
}

impl CoinGeckoSource {
    pub fn new(config: CoinGeckoConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Extract `ASSET_QUOTE` pairs from a simple price response, skipping
    /// assets that are missing or unparseable.
    pub fn parse_prices(&self, body: &Value) -> RateMap {
        let vs_currency = self.config.quote_currency.as_str().to_lowercase();
        let mut rates = RateMap::new();

        for (code, asset_id) in &self.config.assets {
            let Some(price) = body.get(asset_id).and_then(|info| info.get(&vs_currency)) else {
                debug!(asset = %asset_id, "No price in CoinGecko response");
                continue;
            };

            let pair = PairKey::new(code.clone(), self.config.quote_currency.clone());
            if let Some(rate) = accept_rate(COINGECKO, &pair, price) {
                rates.insert(pair, rate);
            }
        }

        rates
    }
}

#[async_trait]
impl RateSource for CoinGeckoSource {
    fn name(&self) -> &str {
        COINGECKO
    }

    async fn fetch_rates(&self) -> RatesResult<RateMap> {
        let ids = self
            .config
            .assets
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let vs_currency = self.config.quote_currency.as_str().to_lowercase();

        let request = self
            .client
            .get(&self.config.url)
            .query(&[("ids", ids.as_str()), ("vs_currencies", vs_currency.as_str())])
            .timeout(self.config.timeout);

        let body = fetch_json(COINGECKO, request).await?;
        Ok(self.parse_prices(&body))
    }
}
