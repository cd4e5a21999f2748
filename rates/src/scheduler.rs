//! Periodic update cycles.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::{RatesError, RatesResult};
use crate::updater::RatesUpdater;

/// Runs [`RatesUpdater::run_update`] on a fixed interval.
///
/// Cycles never overlap: the next tick is only awaited once the previous
/// cycle has finished.
pub struct Scheduler {
    updater: RatesUpdater,
    interval: Duration,
}

impl Scheduler {
    pub fn new(updater: RatesUpdater, interval: Duration) -> RatesResult<Self> {
        if interval.is_zero() {
            return Err(RatesError::Configuration(
                "Update interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self { updater, interval })
    }

    pub fn updater(&self) -> &RatesUpdater {
        &self.updater
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run cycles until `shutdown` resolves. The first cycle starts
    /// immediately. Returns the number of cycles run, failed ones included.
    pub async fn run_until<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs_f64(), "Scheduler started");

        let mut cycles = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            match self.updater.run_update().await {
                Ok(summary) if summary.failures.is_empty() => {
                    info!(cycle = cycles + 1, pairs = summary.pair_count, "Scheduled update complete");
                }
                Ok(summary) => {
                    warn!(
                        cycle = cycles + 1,
                        pairs = summary.pair_count,
                        failed = summary.failures.len(),
                        "Scheduled update completed with errors"
                    );
                }
                Err(e) => {
                    error!(cycle = cycles + 1, error = %e, "Scheduled update failed");
                }
            }
            cycles += 1;
        }

        info!(cycles, "Scheduler stopped");
        cycles
    }
}
