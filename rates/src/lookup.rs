//! Cached rate lookups with TTL enforcement and reverse-pair derivation.
//!
//! The snapshot stores one direction per pair. A query for `TO_FROM` is
//! answered by inverting the stored `FROM_TO` rate.

use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, warn};
use valutatrade_common::{age, now, CurrencyCode, CurrencyRegistry, PairKey, Timestamp};

use crate::config::LookupConfig;
use crate::error::{RatesError, RatesResult};
use crate::store::{RateRecord, RateStore, Snapshot};

/// Digits shown after the decimal point in rate messages.
pub const DISPLAY_DECIMALS: u32 = 8;

/// Render a rate with fixed precision.
pub fn format_rate(rate: Decimal) -> String {
    format!("{:.*}", DISPLAY_DECIMALS as usize, rate.round_dp(DISPLAY_DECIMALS))
}

/// Result of a single rate query.
#[derive(Debug, Clone, PartialEq)]
pub struct RateAnswer {
    /// The pair that was asked for.
    pub pair: PairKey,
    /// The rate, or `None` when no direction of the pair is cached.
    pub rate: Option<Decimal>,
    /// Human-readable answer.
    pub message: String,
    /// `updated_at` of the record the rate came from.
    pub updated_at: Option<String>,
    /// Whether the rate was derived from the reverse pair.
    pub inverted: bool,
}

impl RateAnswer {
    fn found(pair: PairKey, rate: Decimal, record: &RateRecord, inverted: bool) -> Self {
        let message = format!(
            "Rate {}→{}: {} (updated: {})",
            pair.from,
            pair.to,
            format_rate(rate),
            record.updated_at
        );
        Self {
            pair,
            rate: Some(rate),
            message,
            updated_at: Some(record.updated_at.clone()),
            inverted,
        }
    }

    fn unavailable(pair: PairKey) -> Self {
        let message = format!("{}→{}: rate unavailable. Try again later.", pair.from, pair.to);
        Self {
            pair,
            rate: None,
            message,
            updated_at: None,
            inverted: false,
        }
    }

    pub fn is_available(&self) -> bool {
        self.rate.is_some()
    }
}

/// Answer a query against an already loaded snapshot.
///
/// Fails with [`RatesError::StaleCache`] when `last_refresh` is older than
/// `ttl`. A missing or unparseable `last_refresh` skips the check.
pub fn resolve(
    snapshot: &Snapshot,
    from: &CurrencyCode,
    to: &CurrencyCode,
    ttl: Duration,
    now: Timestamp,
) -> RatesResult<RateAnswer> {
    check_freshness(snapshot, ttl, now)?;

    let pair = PairKey::new(from.clone(), to.clone());

    if let Some(record) = snapshot.get(&pair) {
        debug!(pair = %pair, "Direct rate hit");
        return Ok(RateAnswer::found(pair, record.rate, record, false));
    }

    let reverse = pair.inverse();
    if let Some(record) = snapshot.get(&reverse) {
        let rate = Decimal::ONE
            .checked_div(record.rate)
            .ok_or_else(|| RatesError::InvalidRate {
                pair: reverse.to_string(),
                rate: record.rate,
            })?;
        debug!(pair = %pair, reverse = %reverse, "Rate derived from reverse pair");
        return Ok(RateAnswer::found(pair, rate, record, true));
    }

    debug!(pair = %pair, "No cached rate in either direction");
    Ok(RateAnswer::unavailable(pair))
}

fn check_freshness(snapshot: &Snapshot, ttl: Duration, now: Timestamp) -> RatesResult<()> {
    let Some(refreshed_at) = snapshot.last_refresh_at() else {
        return Ok(());
    };

    let elapsed = age(refreshed_at, now);
    // Negative ages (clock skew) do not convert and count as fresh.
    match elapsed.to_std() {
        Ok(elapsed_std) if elapsed_std > ttl => {
            warn!(
                age_secs = elapsed.num_seconds(),
                ttl_secs = ttl.as_secs(),
                "Refusing lookup against stale snapshot"
            );
            Err(RatesError::StaleCache {
                age_secs: elapsed.num_seconds(),
                ttl_secs: ttl.as_secs() as i64,
            })
        }
        _ => Ok(()),
    }
}

/// One row of a snapshot listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRow {
    /// Pair key as stored.
    pub pair: String,
    pub record: RateRecord,
}

/// Filtered view over the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RateListing {
    pub rows: Vec<RateRow>,
    pub last_refresh: Option<String>,
}

/// Read-side service over the rate store.
pub struct RateLookup {
    store: RateStore,
    registry: CurrencyRegistry,
    config: LookupConfig,
}

impl RateLookup {
    pub fn new(store: RateStore, registry: CurrencyRegistry, config: LookupConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    /// Get the rate for `from → to` from the cached snapshot.
    pub fn get_rate(&self, from: &str, to: &str) -> RatesResult<RateAnswer> {
        let from = self.registry.get(from)?.code.clone();
        let to = self.registry.get(to)?.code.clone();

        let snapshot = self.store.load_snapshot();
        resolve(&snapshot, &from, &to, self.config.ttl, now())
    }

    /// List cached rates in key order.
    ///
    /// `currency` keeps pairs with that code on either side; `top` keeps the
    /// N highest rates, highest first. No TTL check is applied.
    pub fn list_rates(&self, currency: Option<&str>, top: Option<usize>) -> RatesResult<RateListing> {
        let filter = match currency {
            Some(code) => Some(self.registry.get(code)?.code.clone()),
            None => None,
        };

        let snapshot = self.store.load_snapshot();
        let mut rows: Vec<RateRow> = snapshot
            .pairs
            .into_iter()
            .filter(|(key, _)| match &filter {
                Some(code) => key
                    .parse::<PairKey>()
                    .map(|pair| pair.involves(code))
                    .unwrap_or(false),
                None => true,
            })
            .map(|(pair, record)| RateRow { pair, record })
            .collect();

        if let Some(n) = top {
            rows.sort_by(|a, b| b.record.rate.cmp(&a.record.rate));
            rows.truncate(n);
        }

        Ok(RateListing {
            rows,
            last_refresh: snapshot.last_refresh,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::SourceMap;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use valutatrade_common::format_timestamp;

    const TTL: Duration = Duration::from_secs(300);

    fn fixed_now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn code(c: &str) -> CurrencyCode {
        CurrencyCode::new(c).unwrap()
    }

    fn record(rate: Decimal, updated_at: &str) -> RateRecord {
        RateRecord {
            rate,
            updated_at: updated_at.to_string(),
            source: "test".to_string(),
        }
    }

    fn snapshot_at(refreshed_at: Option<Timestamp>, pairs: &[(&str, Decimal)]) -> Snapshot {
        let stamp = refreshed_at.map(format_timestamp);
        let updated_at = stamp.clone().unwrap_or_default();
        Snapshot {
            pairs: pairs
                .iter()
                .map(|(k, r)| (k.to_string(), record(*r, &updated_at)))
                .collect::<BTreeMap<_, _>>(),
            last_refresh: stamp,
        }
    }

    fn lookup_in(dir: &TempDir) -> (RateLookup, RateStore) {
        let store = RateStore::new(StoreConfig::in_dir(dir.path()));
        let lookup = RateLookup::new(store.clone(), CurrencyRegistry::default(), LookupConfig::default());
        (lookup, store)
    }

    fn seed(store: &RateStore, pairs: &[(&str, Decimal)]) {
        let rates = pairs.iter().map(|(k, r)| (k.parse().unwrap(), *r)).collect();
        store.save_snapshot(&rates, &SourceMap::new()).unwrap();
    }

    #[test]
    fn test_direct_hit() {
        let t = fixed_now();
        let snapshot = snapshot_at(Some(t), &[("BTC_USD", dec!(65000))]);

        let answer = resolve(&snapshot, &code("BTC"), &code("USD"), TTL, t).unwrap();

        assert_eq!(answer.rate, Some(dec!(65000)));
        assert!(!answer.inverted);
        assert_eq!(
            answer.message,
            format!("Rate BTC→USD: 65000.00000000 (updated: {})", format_timestamp(t))
        );
    }

    #[test]
    fn test_reverse_inversion() {
        let t = fixed_now();
        let snapshot = snapshot_at(Some(t), &[("EUR_USD", dec!(0.92))]);

        let answer = resolve(&snapshot, &code("USD"), &code("EUR"), TTL, t).unwrap();

        assert!(answer.inverted);
        assert_eq!(answer.rate.map(|r| r.round_dp(8)), Some(dec!(1.08695652)));
        assert!(answer.message.starts_with("Rate USD→EUR: 1.08695652"));
    }

    #[test]
    fn test_direct_wins_over_reverse() {
        let t = fixed_now();
        let snapshot = snapshot_at(Some(t), &[("EUR_USD", dec!(0.92)), ("USD_EUR", dec!(1.09))]);

        let answer = resolve(&snapshot, &code("USD"), &code("EUR"), TTL, t).unwrap();

        assert_eq!(answer.rate, Some(dec!(1.09)));
        assert!(!answer.inverted);
    }

    #[test]
    fn test_zero_reverse_rate_is_invalid() {
        let t = fixed_now();
        let snapshot = snapshot_at(Some(t), &[("EUR_USD", dec!(0))]);

        let result = resolve(&snapshot, &code("USD"), &code("EUR"), TTL, t);

        assert!(matches!(result, Err(RatesError::InvalidRate { ref pair, .. }) if pair == "EUR_USD"));
    }

    #[test]
    fn test_missing_pair_is_not_an_error() {
        let t = fixed_now();
        let snapshot = snapshot_at(Some(t), &[("BTC_USD", dec!(65000))]);

        let answer = resolve(&snapshot, &code("ETH"), &code("EUR"), TTL, t).unwrap();

        assert!(!answer.is_available());
        assert_eq!(answer.message, "ETH→EUR: rate unavailable. Try again later.");
    }

    #[test]
    fn test_stale_snapshot_refused() {
        let t = fixed_now();
        let snapshot = snapshot_at(Some(t - ChronoDuration::seconds(600)), &[("BTC_USD", dec!(65000))]);

        let result = resolve(&snapshot, &code("BTC"), &code("USD"), TTL, t);

        match result {
            Err(RatesError::StaleCache { age_secs, ttl_secs }) => {
                assert_eq!(age_secs, 600);
                assert_eq!(ttl_secs, 300);
            }
            other => panic!("expected StaleCache, got {:?}", other),
        }
    }

    #[test]
    fn test_age_equal_to_ttl_is_fresh() {
        let t = fixed_now();
        let snapshot = snapshot_at(Some(t - ChronoDuration::seconds(300)), &[("BTC_USD", dec!(65000))]);

        assert!(resolve(&snapshot, &code("BTC"), &code("USD"), TTL, t).is_ok());
    }

    #[test]
    fn test_future_refresh_is_fresh() {
        let t = fixed_now();
        let snapshot = snapshot_at(Some(t + ChronoDuration::seconds(60)), &[("BTC_USD", dec!(1))]);

        assert!(resolve(&snapshot, &code("BTC"), &code("USD"), TTL, t).is_ok());
    }

    #[test]
    fn test_unparseable_refresh_skips_ttl() {
        let mut snapshot = snapshot_at(None, &[("BTC_USD", dec!(65000))]);
        snapshot.last_refresh = Some("yesterday-ish".to_string());

        let answer = resolve(&snapshot, &code("BTC"), &code("USD"), TTL, now()).unwrap();

        assert_eq!(answer.rate, Some(dec!(65000)));
    }

    #[test]
    fn test_missing_refresh_skips_ttl() {
        let snapshot = snapshot_at(None, &[("BTC_USD", dec!(65000))]);

        assert!(resolve(&snapshot, &code("BTC"), &code("USD"), TTL, now()).is_ok());
    }

    #[test]
    fn test_get_rate_unknown_currency() {
        let dir = TempDir::new().unwrap();
        let (lookup, store) = lookup_in(&dir);
        seed(&store, &[("BTC_USD", dec!(65000))]);

        let result = lookup.get_rate("XYZ", "USD");

        assert!(matches!(result, Err(RatesError::UnknownCurrency(ref c)) if c == "XYZ"));
        assert!(matches!(lookup.get_rate("", "USD"), Err(RatesError::UnknownCurrency(_))));
    }

    #[test]
    fn test_get_rate_normalizes_codes() {
        let dir = TempDir::new().unwrap();
        let (lookup, store) = lookup_in(&dir);
        seed(&store, &[("BTC_USD", dec!(65000))]);

        let answer = lookup.get_rate("btc", " usd ").unwrap();

        assert_eq!(answer.rate, Some(dec!(65000)));
    }

    #[test]
    fn test_get_rate_empty_store() {
        let dir = TempDir::new().unwrap();
        let (lookup, _) = lookup_in(&dir);

        let answer = lookup.get_rate("BTC", "USD").unwrap();

        assert!(!answer.is_available());
    }

    fn write_snapshot(store: &RateStore, document: &str) {
        std::fs::write(store.rates_path(), document).unwrap();
    }

    #[test]
    fn test_get_rate_from_stored_document() {
        let dir = TempDir::new().unwrap();
        let store = RateStore::new(StoreConfig::in_dir(dir.path()));
        let lookup = RateLookup::new(
            store.clone(),
            CurrencyRegistry::default(),
            LookupConfig {
                ttl: Duration::from_secs(100 * 365 * 24 * 3600),
            },
        );
        write_snapshot(
            &store,
            r#"{"pairs":{"BTC_USD":{"rate":65000,"updated_at":"T","source":"CoinGecko"}},"last_refresh":"T"}"#,
        );

        let answer = lookup.get_rate("BTC", "USD").unwrap();

        assert_eq!(answer.rate, Some(dec!(65000)));
        assert_eq!(answer.updated_at.as_deref(), Some("T"));
        assert!(answer.message.contains("65000.00000000"));
    }

    #[test]
    fn test_stale_document_with_malformed_record() {
        let dir = TempDir::new().unwrap();
        let (lookup, store) = lookup_in(&dir);
        write_snapshot(
            &store,
            r#"{"pairs":{"BTC_USD":{"rate":65000,"updated_at":"2020-01-01T00:00:00Z","source":"CoinGecko"},
                         "ETH_USD":{"rate":null}},
                "last_refresh":"2020-01-01T00:00:00Z"}"#,
        );

        assert!(matches!(lookup.get_rate("BTC", "USD"), Err(RatesError::StaleCache { .. })));
        assert!(matches!(lookup.get_rate("SOL", "EUR"), Err(RatesError::StaleCache { .. })));
    }

    #[test]
    fn test_fresh_document_with_malformed_record() {
        let dir = TempDir::new().unwrap();
        let (lookup, store) = lookup_in(&dir);
        let stamp = format_timestamp(now());
        write_snapshot(
            &store,
            &format!(
                r#"{{"pairs":{{"BTC_USD":{{"rate":65000,"updated_at":"{0}","source":"CoinGecko"}},
                              "ETH_USD":{{"rate":"n/a"}}}},
                    "last_refresh":"{0}"}}"#,
                stamp
            ),
        );

        let answer = lookup.get_rate("BTC", "USD").unwrap();

        assert_eq!(answer.rate, Some(dec!(65000)));
        assert!(!lookup.get_rate("ETH", "USD").unwrap().is_available());
    }

    #[test]
    fn test_list_rates_filter_and_top() {
        let dir = TempDir::new().unwrap();
        let (lookup, store) = lookup_in(&dir);
        seed(
            &store,
            &[
                ("BTC_USD", dec!(65000)),
                ("ETH_USD", dec!(3000)),
                ("SOL_USD", dec!(140)),
                ("EUR_USD", dec!(1.08)),
            ],
        );

        let all = lookup.list_rates(None, None).unwrap();
        let keys: Vec<&str> = all.rows.iter().map(|r| r.pair.as_str()).collect();
        assert_eq!(keys, vec!["BTC_USD", "ETH_USD", "EUR_USD", "SOL_USD"]);
        assert!(all.last_refresh.is_some());

        let eur = lookup.list_rates(Some("eur"), None).unwrap();
        assert_eq!(eur.rows.len(), 1);
        assert_eq!(eur.rows[0].pair, "EUR_USD");

        let top = lookup.list_rates(None, Some(2)).unwrap();
        let keys: Vec<&str> = top.rows.iter().map(|r| r.pair.as_str()).collect();
        assert_eq!(keys, vec!["BTC_USD", "ETH_USD"]);
    }

    #[test]
    fn test_list_rates_unknown_filter() {
        let dir = TempDir::new().unwrap();
        let (lookup, _) = lookup_in(&dir);

        assert!(matches!(
            lookup.list_rates(Some("XYZ"), None),
            Err(RatesError::UnknownCurrency(_))
        ));
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(dec!(65000)), "65000.00000000");
        assert_eq!(format_rate(dec!(0.123456789)), "0.12345679");
    }

    proptest! {
        #[test]
        fn prop_reverse_is_reciprocal(mantissa in 1i64..1_000_000_000_000, scale in 0u32..10) {
            let rate = Decimal::new(mantissa, scale);
            let t = fixed_now();
            let snapshot = snapshot_at(Some(t), &[("EUR_USD", rate)]);

            let direct = resolve(&snapshot, &code("EUR"), &code("USD"), TTL, t).unwrap();
            let reverse = resolve(&snapshot, &code("USD"), &code("EUR"), TTL, t).unwrap();

            prop_assert_eq!(direct.rate, Some(rate));
            let inverted = reverse.rate.unwrap();
            prop_assert!(reverse.inverted);
            prop_assert!(inverted > Decimal::ZERO);
            let product = inverted * rate;
            prop_assert!((product - Decimal::ONE).abs() < dec!(0.000000000001));
        }
    }
}
