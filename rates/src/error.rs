//! Rate subsystem error types.

use std::path::PathBuf;

use rust_decimal::Decimal;
use thiserror::Error;
use valutatrade_common::CurrencyError;

/// A single source's failure inside an update cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    /// Name of the failing source.
    pub provider: String,
    /// Human-readable reason.
    pub reason: String,
}

/// Errors that can occur while acquiring, storing or serving rates.
#[derive(Debug, Error)]
pub enum RatesError {
    /// One source could not deliver rates.
    #[error("{provider}: {reason}")]
    SourceUnavailable { provider: String, reason: String },

    /// Every configured source failed and none produced data.
    #[error("No rates obtained from any source ({} failed)", .failures.len())]
    AllSourcesFailed { failures: Vec<SourceFailure> },

    /// Cached snapshot is older than the configured TTL.
    #[error("Rate source unavailable (cache too old: {age_secs}s > {ttl_secs}s)")]
    StaleCache { age_secs: i64, ttl_secs: i64 },

    /// A cached or ingested rate cannot be used.
    #[error("Invalid rate {rate} for {pair}")]
    InvalidRate { pair: String, rate: Decimal },

    /// Code is not in the supported currency set.
    #[error("Unknown currency '{0}'")]
    UnknownCurrency(String),

    /// Malformed currency code or pair key.
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    /// Snapshot or history file could not be read or written.
    #[error("Storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration is incomplete or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RatesError {
    /// Build a source failure.
    pub fn source_unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        RatesError::SourceUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Build a storage error for `path`.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RatesError::Storage {
            path: path.into(),
            source,
        }
    }

    /// Check if retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RatesError::SourceUnavailable { .. }
                | RatesError::AllSourcesFailed { .. }
                | RatesError::StaleCache { .. }
        )
    }

    /// Get stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            RatesError::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            RatesError::AllSourcesFailed { .. } => "ALL_SOURCES_FAILED",
            RatesError::StaleCache { .. } => "STALE_CACHE",
            RatesError::InvalidRate { .. } => "INVALID_RATE",
            RatesError::UnknownCurrency(_) => "UNKNOWN_CURRENCY",
            RatesError::InvalidCurrency(_) => "INVALID_CURRENCY",
            RatesError::Storage { .. } => "STORAGE_ERROR",
            RatesError::Serialization(_) => "SERIALIZATION_ERROR",
            RatesError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

impl From<CurrencyError> for RatesError {
    fn from(err: CurrencyError) -> Self {
        match err {
            CurrencyError::UnknownCurrency(code) => RatesError::UnknownCurrency(code),
            other => RatesError::InvalidCurrency(other.to_string()),
        }
    }
}

/// Result type for rate operations.
pub type RatesResult<T> = Result<T, RatesError>;
