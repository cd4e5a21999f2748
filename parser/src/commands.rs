//! Command handlers.
//!
//! Each handler returns the text to print so the output can be checked
//! without a terminal.

use std::fmt::Write as _;
use std::future::Future;
use std::time::Duration;

use tracing::info;
use valutatrade_common::CurrencyRegistry;
use valutatrade_rates::{
    build_sources, format_rate, ParserConfig, RateLookup, RateStore, RatesError, RatesResult,
    RatesUpdater, Scheduler, SharedRateSource, SourceKind,
};

/// Wires configuration, registry and store together for the CLI.
pub struct App {
    config: ParserConfig,
    registry: CurrencyRegistry,
    store: RateStore,
}

impl App {
    pub fn new(config: ParserConfig) -> Self {
        let store = RateStore::new(config.store());
        Self {
            config,
            registry: CurrencyRegistry::default(),
            store,
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    fn lookup(&self) -> RateLookup {
        RateLookup::new(self.store.clone(), self.registry.clone(), self.config.lookup())
    }

    /// `update-rates`
    pub async fn update_rates(&self, source: Option<SourceKind>) -> RatesResult<String> {
        self.update_with(build_sources(&self.config, source)).await
    }

    /// Run one cycle over `sources` and describe the outcome.
    pub async fn update_with(&self, sources: Vec<SharedRateSource>) -> RatesResult<String> {
        let updater = RatesUpdater::new(sources, self.store.clone());
        let summary = updater.run_update().await?;

        let mut out = String::new();
        let _ = writeln!(out, "{}", summary.message());
        let _ = writeln!(out, "Pairs updated: {}", summary.pair_count);
        let _ = write!(out, "Last refresh: {}", summary.last_refresh_str());
        for failure in &summary.failures {
            let _ = write!(out, "\nFailed source {}: {}", failure.provider, failure.reason);
        }
        Ok(out)
    }

    /// `get-rate`: the rate and, when known, the reverse rate.
    pub fn get_rate(&self, from: &str, to: &str) -> RatesResult<String> {
        let lookup = self.lookup();
        let answer = lookup.get_rate(from, to)?;

        let mut out = answer.message.clone();
        if answer.is_available() {
            let (from, to) = (&answer.pair.from, &answer.pair.to);
            let reverse = lookup.get_rate(to.as_str(), from.as_str())?;
            if let Some(rate) = reverse.rate {
                let _ = write!(out, "\nReverse rate {}→{}: {}", to, from, format_rate(rate));
            }
        }
        Ok(out)
    }

    /// `show-rates`
    pub fn show_rates(&self, currency: Option<&str>, top: Option<usize>) -> RatesResult<String> {
        let listing = self.lookup().list_rates(currency, top)?;

        if listing.rows.is_empty() {
            return Ok(match currency {
                Some(code) => format!("No cached rates for {}.", code.trim().to_uppercase()),
                None => "Rates cache is empty. Run 'update-rates' to load data.".to_string(),
            });
        }

        let mut out = format!(
            "Rates from cache (updated at {}):",
            listing.last_refresh.as_deref().unwrap_or("unknown")
        );
        for row in &listing.rows {
            let _ = write!(
                out,
                "\n- {}: {} ({})",
                row.pair,
                format_rate(row.record.rate),
                row.record.source
            );
        }
        Ok(out)
    }

    /// `currencies`
    pub fn currencies(&self) -> String {
        self.registry
            .iter()
            .map(|info| info.display_info())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `schedule`: run cycles over the configured sources until `shutdown`.
    pub async fn schedule<F>(&self, interval_secs: Option<u64>, shutdown: F) -> RatesResult<String>
    where
        F: Future<Output = ()>,
    {
        self.schedule_with(build_sources(&self.config, None), interval_secs, shutdown)
            .await
    }

    pub async fn schedule_with<F>(
        &self,
        sources: Vec<SharedRateSource>,
        interval_secs: Option<u64>,
        shutdown: F,
    ) -> RatesResult<String>
    where
        F: Future<Output = ()>,
    {
        let interval = interval_secs
            .map(Duration::from_secs)
            .unwrap_or(self.config.update_interval);
        let scheduler = Scheduler::new(RatesUpdater::new(sources, self.store.clone()), interval)?;

        info!(interval_secs = interval.as_secs(), "Press Ctrl+C to stop");
        let cycles = scheduler.run_until(shutdown).await;

        Ok(format!("Scheduler stopped after {} update cycles.", cycles))
    }
}

/// Render an error with a hint for the user.
pub fn render_error(err: &RatesError, registry: &CurrencyRegistry) -> String {
    match err {
        RatesError::UnknownCurrency(_) => {
            let codes = registry
                .codes()
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}\nSupported currencies: {}", err, codes)
        }
        RatesError::StaleCache { .. } => {
            format!("{}\nRun 'update-rates' or try again later.", err)
        }
        RatesError::SourceUnavailable { .. } | RatesError::AllSourcesFailed { .. } => {
            format!("{}\nTry again later or check your network connection.", err)
        }
        _ => err.to_string(),
    }
}
