//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use valutatrade_rates::SourceKind;

/// ValutaTrade rate parser CLI
#[derive(Parser, Debug)]
#[command(name = "valutatrade")]
#[command(about = "Fetch, cache and query ValutaTrade exchange rates")]
pub struct Cli {
    /// JSON settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch rates from the configured sources and refresh the cache
    UpdateRates {
        /// Only query this source
        #[arg(long, value_enum)]
        source: Option<SourceArg>,
    },

    /// Show the cached rate for a currency pair
    GetRate {
        /// Currency to convert from
        #[arg(long)]
        from: String,

        /// Currency to convert to
        #[arg(long)]
        to: String,
    },

    /// List cached rates
    ShowRates {
        /// Only pairs involving this currency
        #[arg(long)]
        currency: Option<String>,

        /// Only the N highest rates
        #[arg(long)]
        top: Option<usize>,
    },

    /// List supported currencies
    Currencies,

    /// Refresh rates periodically until Ctrl+C
    Schedule {
        /// Seconds between cycles (defaults to the configured interval)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceArg {
    Coingecko,
    Exchangerate,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Coingecko => SourceKind::CoinGecko,
            SourceArg::Exchangerate => SourceKind::ExchangeRateApi,
        }
    }
}
