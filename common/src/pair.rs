//! Directional currency pair keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::currency::CurrencyCode;
use crate::error::{CurrencyError, Result};

/// Directional pair identifier serialized as `FROM_TO`.
///
/// `A_B` and `B_A` are distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PairKey {
    /// Currency being priced.
    pub from: CurrencyCode,
    /// Currency the price is expressed in.
    pub to: CurrencyCode,
}

impl PairKey {
    /// Create a new pair key.
    pub fn new(from: CurrencyCode, to: CurrencyCode) -> Self {
        Self { from, to }
    }

    /// Parse both halves from raw codes.
    pub fn from_codes(from: &str, to: &str) -> Result<Self> {
        Ok(Self::new(CurrencyCode::new(from)?, CurrencyCode::new(to)?))
    }

    /// Get the reverse pair.
    pub fn inverse(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }

    /// Whether either side of the pair is `code`.
    pub fn involves(&self, code: &CurrencyCode) -> bool {
        &self.from == code || &self.to == code
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.from, self.to)
    }
}

impl FromStr for PairKey {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self> {
        let (from, to) = s
            .split_once('_')
            .ok_or_else(|| CurrencyError::InvalidPairKey(s.to_string()))?;

        Self::from_codes(from, to).map_err(|_| CurrencyError::InvalidPairKey(s.to_string()))
    }
}

impl TryFrom<String> for PairKey {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PairKey> for String {
    fn from(pair: PairKey) -> Self {
        pair.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_display_and_parse() {
        let pair: PairKey = "btc_usd".parse().unwrap();

        assert_eq!(pair.from, CurrencyCode::btc());
        assert_eq!(pair.to, CurrencyCode::usd());
        assert_eq!(pair.to_string(), "BTC_USD");
    }

    #[test]
    fn test_pair_is_directional() {
        let pair = PairKey::from_codes("USD", "EUR").unwrap();
        let inverse = pair.inverse();

        assert_ne!(pair, inverse);
        assert_eq!(inverse.to_string(), "EUR_USD");
        assert_eq!(inverse.inverse(), pair);
    }

    #[test]
    fn test_invalid_pair_keys() {
        assert!("BTCUSD".parse::<PairKey>().is_err());
        assert!("B_USD".parse::<PairKey>().is_err());
        assert!("BTC_US_D".parse::<PairKey>().is_err());
        assert!("_USD".parse::<PairKey>().is_err());
    }

    #[test]
    fn test_involves() {
        let pair = PairKey::from_codes("ETH", "USD").unwrap();

        assert!(pair.involves(&CurrencyCode::usd()));
        assert!(!pair.involves(&CurrencyCode::eur()));
    }
}
