//! Parser service configuration.
//!
//! `ParserConfig` is assembled from built-in defaults, an optional JSON
//! settings file and environment overrides, then split into the narrow
//! per-component configs each part of the subsystem is constructed with.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use valutatrade_common::CurrencyCode;

use crate::error::{RatesError, RatesResult};

pub const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3/simple/price";
pub const DEFAULT_EXCHANGERATE_API_URL: &str = "https://v6.exchangerate-api.com/v6";

/// CoinGecko client configuration.
#[derive(Debug, Clone)]
pub struct CoinGeckoConfig {
    /// Simple price endpoint.
    pub url: String,
    /// Asset code to CoinGecko asset id, e.g. `BTC -> bitcoin`.
    pub assets: BTreeMap<CurrencyCode, String>,
    /// Currency all prices are quoted in.
    pub quote_currency: CurrencyCode,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// ExchangeRate-API client configuration.
#[derive(Debug, Clone)]
pub struct ExchangeRateApiConfig {
    /// API root; key and base currency are appended as path segments.
    pub url: String,
    /// API key. Absent keys fail the source without a network call.
    pub api_key: Option<String>,
    /// Base currency requested from the API.
    pub base_currency: CurrencyCode,
    /// Fiat codes to extract from the response.
    pub currencies: Vec<CurrencyCode>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Rate store file locations.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Snapshot document.
    pub rates_path: PathBuf,
    /// History document.
    pub history_path: PathBuf,
    /// Keep only the newest N history entries (None = keep all).
    pub history_limit: Option<usize>,
}

impl StoreConfig {
    /// Standard file names under `data_dir`.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            rates_path: data_dir.join("rates.json"),
            history_path: data_dir.join("exchange_rates.json"),
            history_limit: None,
        }
    }
}

/// Rate lookup configuration.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Maximum tolerated age of the snapshot's `last_refresh`.
    pub ttl: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
        }
    }
}

/// Main parser service configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Directory holding the snapshot and history files.
    pub data_dir: PathBuf,
    /// Currency every fetched pair is priced against.
    pub base_currency: CurrencyCode,
    /// CoinGecko simple price endpoint.
    pub coingecko_url: String,
    /// ExchangeRate-API root.
    pub exchangerate_api_url: String,
    /// ExchangeRate-API key.
    pub exchangerate_api_key: Option<String>,
    /// Crypto assets polled from CoinGecko.
    pub crypto_assets: BTreeMap<CurrencyCode, String>,
    /// Fiat universe polled from ExchangeRate-API.
    pub fiat_currencies: Vec<CurrencyCode>,
    /// Per-request timeout for every source.
    pub request_timeout: Duration,
    /// Snapshot TTL enforced by lookups.
    pub rates_ttl: Duration,
    /// Scheduler interval.
    pub update_interval: Duration,
    /// History retention.
    pub history_limit: Option<usize>,
    /// Log level.
    pub log_level: String,
    /// Emit JSON log lines.
    pub log_json: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        let code = |c: &str| CurrencyCode::new(c).ok();
        let crypto_assets = [("BTC", "bitcoin"), ("ETH", "ethereum"), ("SOL", "solana")]
            .into_iter()
            .filter_map(|(c, id)| code(c).map(|c| (c, id.to_string())))
            .collect();
        let fiat_currencies = ["EUR", "GBP", "RUB", "CNY"]
            .into_iter()
            .filter_map(code)
            .collect();

        Self {
            data_dir: PathBuf::from("data"),
            base_currency: CurrencyCode::usd(),
            coingecko_url: DEFAULT_COINGECKO_URL.to_string(),
            exchangerate_api_url: DEFAULT_EXCHANGERATE_API_URL.to_string(),
            exchangerate_api_key: None,
            crypto_assets,
            fiat_currencies,
            request_timeout: Duration::from_secs(10),
            rates_ttl: Duration::from_secs(300),
            update_interval: Duration::from_secs(300),
            history_limit: None,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

/// Optional keys of the JSON settings file.
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    data_dir: Option<PathBuf>,
    base_currency: Option<CurrencyCode>,
    coingecko_url: Option<String>,
    exchangerate_api_url: Option<String>,
    exchangerate_api_key: Option<String>,
    crypto_assets: Option<BTreeMap<CurrencyCode, String>>,
    fiat_currencies: Option<Vec<CurrencyCode>>,
    request_timeout_seconds: Option<u64>,
    rates_ttl_seconds: Option<u64>,
    update_interval_seconds: Option<u64>,
    history_limit: Option<usize>,
    log_level: Option<String>,
    log_format: Option<String>,
}

impl ParserConfig {
    /// Load defaults, then `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> RatesResult<Self> {
        let mut config = Self::default();

        if let Some(path) = path {
            config.apply_file(path)?;
        }

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Overlay values from a JSON settings file.
    pub fn apply_file(&mut self, path: &Path) -> RatesResult<()> {
        let raw = std::fs::read_to_string(path).map_err(|e| RatesError::storage(path, e))?;
        let file: SettingsFile = serde_json::from_str(&raw).map_err(|e| {
            RatesError::Configuration(format!("{}: {}", path.display(), e))
        })?;

        if let Some(dir) = file.data_dir {
            self.data_dir = dir;
        }
        if let Some(base) = file.base_currency {
            self.base_currency = base;
        }
        if let Some(url) = file.coingecko_url {
            self.coingecko_url = url;
        }
        if let Some(url) = file.exchangerate_api_url {
            self.exchangerate_api_url = url;
        }
        if let Some(key) = file.exchangerate_api_key {
            self.exchangerate_api_key = Some(key);
        }
        if let Some(assets) = file.crypto_assets {
            self.crypto_assets = assets;
        }
        if let Some(fiat) = file.fiat_currencies {
            self.fiat_currencies = fiat;
        }
        if let Some(secs) = file.request_timeout_seconds {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.rates_ttl_seconds {
            self.rates_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = file.update_interval_seconds {
            self.update_interval = Duration::from_secs(secs);
        }
        if let Some(limit) = file.history_limit {
            self.history_limit = Some(limit);
        }
        if let Some(level) = file.log_level {
            self.log_level = level;
        }
        if let Some(format) = file.log_format {
            self.log_json = format.eq_ignore_ascii_case("json");
        }

        Ok(())
    }

    /// Overlay environment variables read through `var`.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = var("VALUTATRADE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(base) = var("BASE_CURRENCY") {
            if let Ok(base) = CurrencyCode::new(base) {
                self.base_currency = base;
            }
        }

        if let Some(key) = var("EXCHANGERATE_API_KEY") {
            if !key.trim().is_empty() {
                self.exchangerate_api_key = Some(key);
            }
        }

        if let Some(url) = var("COINGECKO_URL") {
            self.coingecko_url = url;
        }

        if let Some(url) = var("EXCHANGERATE_API_URL") {
            self.exchangerate_api_url = url;
        }

        if let Some(secs) = var("RATES_TTL_SECONDS").and_then(|v| v.parse().ok()) {
            self.rates_ttl = Duration::from_secs(secs);
        }

        if let Some(secs) = var("REQUEST_TIMEOUT_SECONDS").and_then(|v| v.parse().ok()) {
            self.request_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = var("UPDATE_INTERVAL_SECONDS").and_then(|v| v.parse().ok()) {
            self.update_interval = Duration::from_secs(secs);
        }

        if let Some(limit) = var("HISTORY_LIMIT").and_then(|v| v.parse().ok()) {
            self.history_limit = Some(limit);
        }

        if let Some(level) = var("LOG_LEVEL") {
            self.log_level = level;
        }

        if let Some(format) = var("LOG_FORMAT") {
            self.log_json = format.eq_ignore_ascii_case("json");
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> RatesResult<()> {
        if self.request_timeout.is_zero() {
            return Err(RatesError::Configuration(
                "Request timeout cannot be zero".to_string(),
            ));
        }

        if self.update_interval.is_zero() {
            return Err(RatesError::Configuration(
                "Update interval cannot be zero".to_string(),
            ));
        }

        if self.rates_ttl.is_zero() {
            return Err(RatesError::Configuration(
                "Rates TTL cannot be zero".to_string(),
            ));
        }

        if self.coingecko_url.trim().is_empty() || self.exchangerate_api_url.trim().is_empty() {
            return Err(RatesError::Configuration(
                "Provider URLs cannot be empty".to_string(),
            ));
        }

        if self.crypto_assets.is_empty() && self.fiat_currencies.is_empty() {
            return Err(RatesError::Configuration(
                "At least one crypto asset or fiat currency must be configured".to_string(),
            ));
        }

        Ok(())
    }

    /// Config for the CoinGecko source.
    pub fn coingecko(&self) -> CoinGeckoConfig {
        CoinGeckoConfig {
            url: self.coingecko_url.clone(),
            assets: self.crypto_assets.clone(),
            quote_currency: self.base_currency.clone(),
            timeout: self.request_timeout,
        }
    }

    /// Config for the ExchangeRate-API source.
    pub fn exchangerate(&self) -> ExchangeRateApiConfig {
        ExchangeRateApiConfig {
            url: self.exchangerate_api_url.clone(),
            api_key: self.exchangerate_api_key.clone(),
            base_currency: self.base_currency.clone(),
            currencies: self.fiat_currencies.clone(),
            timeout: self.request_timeout,
        }
    }

    /// Config for the rate store.
    pub fn store(&self) -> StoreConfig {
        StoreConfig {
            history_limit: self.history_limit,
            ..StoreConfig::in_dir(&self.data_dir)
        }
    }

    /// Config for the lookup service.
    pub fn lookup(&self) -> LookupConfig {
        LookupConfig {
            ttl: self.rates_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ParserConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_currency, CurrencyCode::usd());
        assert_eq!(config.crypto_assets.len(), 3);
        assert!(config.exchangerate_api_key.is_none());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = ParserConfig::default();
        config.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = ParserConfig::default();
        config.crypto_assets.clear();
        config.fiat_currencies.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ParserConfig::default();
        config.apply_env(env(&[
            ("VALUTATRADE_DATA_DIR", "/tmp/rates"),
            ("BASE_CURRENCY", "eur"),
            ("EXCHANGERATE_API_KEY", "secret"),
            ("RATES_TTL_SECONDS", "60"),
            ("HISTORY_LIMIT", "1000"),
            ("LOG_FORMAT", "JSON"),
        ]));

        assert_eq!(config.data_dir, PathBuf::from("/tmp/rates"));
        assert_eq!(config.base_currency, CurrencyCode::eur());
        assert_eq!(config.exchangerate_api_key.as_deref(), Some("secret"));
        assert_eq!(config.rates_ttl, Duration::from_secs(60));
        assert_eq!(config.history_limit, Some(1000));
        assert!(config.log_json);

        let store = config.store();
        assert_eq!(store.rates_path, PathBuf::from("/tmp/rates/rates.json"));
        assert_eq!(store.history_limit, Some(1000));
        assert_eq!(config.coingecko().quote_currency, CurrencyCode::eur());
    }

    #[test]
    fn test_unparseable_env_values_are_ignored() {
        let mut config = ParserConfig::default();
        config.apply_env(env(&[
            ("RATES_TTL_SECONDS", "soon"),
            ("BASE_CURRENCY", "not a code"),
            ("EXCHANGERATE_API_KEY", "  "),
        ]));

        assert_eq!(config.rates_ttl, Duration::from_secs(300));
        assert_eq!(config.base_currency, CurrencyCode::usd());
        assert!(config.exchangerate_api_key.is_none());
    }

    #[test]
    fn test_settings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "data_dir": "/var/lib/valutatrade",
                "fiat_currencies": ["eur", "gbp"],
                "crypto_assets": {{"BTC": "bitcoin"}},
                "rates_ttl_seconds": 3600
            }}"#
        )
        .unwrap();

        let mut config = ParserConfig::default();
        config.apply_file(file.path()).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/valutatrade"));
        assert_eq!(config.fiat_currencies, vec![CurrencyCode::eur(), CurrencyCode::new("GBP").unwrap()]);
        assert_eq!(config.crypto_assets.len(), 1);
        assert_eq!(config.lookup().ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_malformed_settings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let mut config = ParserConfig::default();
        let result = config.apply_file(file.path());

        assert!(matches!(result, Err(RatesError::Configuration(_))));
    }
}
