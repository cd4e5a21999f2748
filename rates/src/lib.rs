//! ValutaTrade Rates
//!
//! Rate acquisition and caching for the ValutaTrade exchange.
//!
//! # Features
//!
//! - Independent rate sources (CoinGecko, ExchangeRate-API) behind one trait
//! - Concurrent fetch with deterministic last-write-wins merging
//! - Atomic snapshot writes and an append-only rate history
//! - Cached lookups with TTL enforcement and reverse-pair inversion
//! - Interval scheduling of update cycles
//!
//! # Example
//!
//! ```rust,ignore
//! use valutatrade_rates::{build_sources, ParserConfig, RateLookup, RateStore, RatesUpdater};
//! use valutatrade_common::CurrencyRegistry;
//!
//! let config = ParserConfig::load(None)?;
//! let store = RateStore::new(config.store());
//!
//! let updater = RatesUpdater::new(build_sources(&config, None), store.clone());
//! let summary = updater.run_update().await?;
//! println!("{} ({} pairs)", summary.message(), summary.pair_count);
//!
//! let lookup = RateLookup::new(store, CurrencyRegistry::default(), config.lookup());
//! let answer = lookup.get_rate("USD", "EUR")?;
//! println!("{}", answer.message);
//! ```

pub mod coingecko;
pub mod config;
pub mod error;
pub mod exchangerate_api;
pub mod lookup;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod updater;

pub use coingecko::CoinGeckoSource;
pub use config::{CoinGeckoConfig, ExchangeRateApiConfig, LookupConfig, ParserConfig, StoreConfig};
pub use error::{RatesError, RatesResult, SourceFailure};
pub use exchangerate_api::ExchangeRateApiSource;
pub use lookup::{format_rate, resolve, RateAnswer, RateListing, RateLookup, RateRow};
pub use scheduler::Scheduler;
pub use source::{build_sources, RateSource, SharedRateSource, SourceKind};
pub use store::{HistoryEntry, RateMap, RateRecord, RateStore, Snapshot, SourceMap, StagedWrite};
pub use updater::{RatesUpdater, UpdateStatus, UpdateSummary};

#[cfg(any(test, feature = "test-utils"))]
pub use source::MockRateSource;
