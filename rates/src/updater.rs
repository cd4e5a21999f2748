//! Rate aggregation cycle.

use std::fmt;

use futures::future::join_all;
use tracing::{error, info, instrument};
use valutatrade_common::{format_timestamp, Timestamp};

use crate::error::{RatesError, RatesResult, SourceFailure};
use crate::source::SharedRateSource;
use crate::store::{RateMap, RateStore, SourceMap};

/// Outcome of a completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Every source delivered.
    AllSucceeded,
    /// At least one source failed, but data was persisted.
    PartialFailure,
}

impl UpdateStatus {
    pub fn message(&self) -> &'static str {
        match self {
            UpdateStatus::AllSucceeded => "Update successful.",
            UpdateStatus::PartialFailure => "Update completed with errors. Check logs for details.",
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Summary returned by [`RatesUpdater::run_update`].
#[derive(Debug, Clone)]
pub struct UpdateSummary {
    pub status: UpdateStatus,
    /// Number of pairs in the persisted snapshot.
    pub pair_count: usize,
    /// Timestamp shared by the snapshot and every record in it.
    pub last_refresh: Timestamp,
    /// Sources that failed, in query order.
    pub failures: Vec<SourceFailure>,
}

impl UpdateSummary {
    pub fn message(&self) -> &'static str {
        self.status.message()
    }

    /// `last_refresh` as written to the snapshot.
    pub fn last_refresh_str(&self) -> String {
        format_timestamp(self.last_refresh)
    }
}

/// Merged output of one fetch round.
#[derive(Debug, Default)]
struct Collected {
    rates: RateMap,
    sources: SourceMap,
    failures: Vec<SourceFailure>,
}

/// Queries every source, merges their rates and persists the result.
pub struct RatesUpdater {
    sources: Vec<SharedRateSource>,
    store: RateStore,
}

impl RatesUpdater {
    /// Create an updater. Source order decides duplicate pairs: later wins.
    pub fn new(sources: Vec<SharedRateSource>, store: RateStore) -> Self {
        Self { sources, store }
    }

    pub fn store(&self) -> &RateStore {
        &self.store
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Run one aggregation cycle.
    ///
    /// Fails with [`RatesError::AllSourcesFailed`] only when nothing was
    /// obtained and at least one source failed; in that case no file is
    /// touched.
    #[instrument(skip(self), fields(sources = self.sources.len()))]
    pub async fn run_update(&self) -> RatesResult<UpdateSummary> {
        info!("Starting rates update");

        let collected = self.collect().await;

        if collected.rates.is_empty() && !collected.failures.is_empty() {
            error!(failed = collected.failures.len(), "No rates obtained from any source");
            return Err(RatesError::AllSourcesFailed {
                failures: collected.failures,
            });
        }

        let last_refresh = self
            .store
            .save_snapshot(&collected.rates, &collected.sources)?;

        // One history batch per distinct source name, in query order.
        let mut names: Vec<&str> = Vec::new();
        for source in &self.sources {
            if !names.contains(&source.name()) {
                names.push(source.name());
            }
        }

        for name in names {
            let batch: RateMap = collected
                .rates
                .iter()
                .filter(|(pair, _)| collected.sources.get(*pair).map(String::as_str) == Some(name))
                .map(|(pair, rate)| (pair.clone(), *rate))
                .collect();

            if !batch.is_empty() {
                self.store.append_history(&batch, name)?;
            }
        }

        let status = if collected.failures.is_empty() {
            UpdateStatus::AllSucceeded
        } else {
            UpdateStatus::PartialFailure
        };

        let summary = UpdateSummary {
            status,
            pair_count: collected.rates.len(),
            last_refresh,
            failures: collected.failures,
        };

        info!(
            pairs = summary.pair_count,
            failed = summary.failures.len(),
            last_refresh = %summary.last_refresh_str(),
            "Rates update finished"
        );

        Ok(summary)
    }

    /// Fetch all sources concurrently and merge in source order.
    async fn collect(&self) -> Collected {
        let results = join_all(self.sources.iter().map(|source| source.fetch_rates())).await;

        let mut collected = Collected::default();
        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(rates) => {
                    info!(source = source.name(), count = rates.len(), "Fetched rates");
                    for (pair, rate) in rates {
                        collected.sources.insert(pair.clone(), source.name().to_string());
                        collected.rates.insert(pair, rate);
                    }
                }
                Err(e) => {
                    let reason = match e {
                        RatesError::SourceUnavailable { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    error!(source = source.name(), error = %reason, "Failed to fetch rates");
                    collected.failures.push(SourceFailure {
                        provider: source.name().to_string(),
                        reason,
                    });
                }
            }
        }

        collected
    }
}
