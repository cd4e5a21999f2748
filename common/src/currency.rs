//! Currency codes and the supported-currency registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CurrencyError, Result};

/// Uppercase currency code, 2-5 characters, no whitespace or underscores.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Validate and normalize a code.
    pub fn new(code: impl AsRef<str>) -> Result<Self> {
        let raw = code.as_ref();
        let normalized = raw.trim().to_uppercase();
        let len = normalized.chars().count();

        // `_` separates the halves of a pair key
        if !(2..=5).contains(&len) || normalized.chars().any(|c| c.is_whitespace() || c == '_') {
            return Err(CurrencyError::InvalidCode(raw.to_string()));
        }

        Ok(Self(normalized))
    }

    /// Get the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Common currencies
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    pub fn btc() -> Self {
        Self("BTC".to_string())
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

/// Fiat or crypto specific details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CurrencyKind {
    Fiat { issuing_country: String },
    Crypto { algorithm: String, market_cap: f64 },
}

/// A supported currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyInfo {
    /// Currency code.
    pub code: CurrencyCode,
    /// Human-readable name.
    pub name: String,
    /// Fiat or crypto details.
    pub kind: CurrencyKind,
}

impl CurrencyInfo {
    /// Create a fiat currency entry.
    pub fn fiat(code: CurrencyCode, name: impl Into<String>, issuing_country: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            kind: CurrencyKind::Fiat {
                issuing_country: issuing_country.into(),
            },
        }
    }

    /// Create a crypto currency entry.
    pub fn crypto(
        code: CurrencyCode,
        name: impl Into<String>,
        algorithm: impl Into<String>,
        market_cap: f64,
    ) -> Self {
        Self {
            code,
            name: name.into(),
            kind: CurrencyKind::Crypto {
                algorithm: algorithm.into(),
                market_cap,
            },
        }
    }

    /// Whether this is a crypto asset.
    pub fn is_crypto(&self) -> bool {
        matches!(self.kind, CurrencyKind::Crypto { .. })
    }

    /// One-line description used by listings.
    pub fn display_info(&self) -> String {
        match &self.kind {
            CurrencyKind::Fiat { issuing_country } => {
                format!("[FIAT] {} — {} (Issuing: {})", self.code, self.name, issuing_country)
            }
            CurrencyKind::Crypto {
                algorithm,
                market_cap,
            } => format!(
                "[CRYPTO] {} — {} (Algo: {}, MCAP: {:.2e})",
                self.code, self.name, algorithm, market_cap
            ),
        }
    }
}

/// Set of currencies the system accepts in lookups.
#[derive(Debug, Clone)]
pub struct CurrencyRegistry {
    currencies: BTreeMap<CurrencyCode, CurrencyInfo>,
}

impl CurrencyRegistry {
    /// Create an empty registry.
    pub fn empty() -> Self {
        Self {
            currencies: BTreeMap::new(),
        }
    }

    /// Add or replace a currency.
    pub fn register(&mut self, info: CurrencyInfo) {
        self.currencies.insert(info.code.clone(), info);
    }

    /// Resolve a code to a supported currency.
    ///
    /// Malformed and empty codes are reported as unknown, so callers get a
    /// single failure mode for anything outside the supported set.
    pub fn get(&self, code: &str) -> Result<&CurrencyInfo> {
        let normalized = code.trim().to_uppercase();
        let parsed = CurrencyCode::new(&normalized)
            .map_err(|_| CurrencyError::UnknownCurrency(normalized.clone()))?;

        self.currencies
            .get(&parsed)
            .ok_or(CurrencyError::UnknownCurrency(normalized))
    }

    /// Check whether a code is supported.
    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_ok()
    }

    /// Iterate currencies in code order.
    pub fn iter(&self) -> impl Iterator<Item = &CurrencyInfo> {
        self.currencies.values()
    }

    /// Supported codes in order.
    pub fn codes(&self) -> Vec<&CurrencyCode> {
        self.currencies.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }
}

impl Default for CurrencyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        let code = |c: &str| CurrencyCode(c.to_string());

        registry.register(CurrencyInfo::fiat(code("USD"), "US Dollar", "United States"));
        registry.register(CurrencyInfo::fiat(code("EUR"), "Euro", "Eurozone"));
        registry.register(CurrencyInfo::fiat(code("GBP"), "British Pound", "United Kingdom"));
        registry.register(CurrencyInfo::fiat(code("RUB"), "Russian Ruble", "Russia"));
        registry.register(CurrencyInfo::fiat(code("CNY"), "Chinese Yuan", "China"));
        registry.register(CurrencyInfo::crypto(code("BTC"), "Bitcoin", "SHA-256", 1.12e12));
        registry.register(CurrencyInfo::crypto(code("ETH"), "Ethereum", "Ethash", 4.80e11));
        registry.register(CurrencyInfo::crypto(code("SOL"), "Solana", "Proof of History", 8.0e10));

        registry
    }
}
