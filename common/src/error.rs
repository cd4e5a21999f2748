//! Error types for currency and pair handling.

use thiserror::Error;

/// Errors raised while validating currency codes and pair keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    /// Code does not satisfy the 2-5 character format.
    #[error("Invalid currency code '{0}': expected 2-5 characters without whitespace or '_'")]
    InvalidCode(String),

    /// Code is well formed but not in the supported set.
    #[error("Unknown currency '{0}'")]
    UnknownCurrency(String),

    /// Pair key is not of the form `FROM_TO`.
    #[error("Invalid pair key '{0}': expected FROM_TO")]
    InvalidPairKey(String),
}

impl CurrencyError {
    /// Get error code for user-facing messages.
    pub fn error_code(&self) -> &'static str {
        match self {
            CurrencyError::InvalidCode(_) => "INVALID_CURRENCY_CODE",
            CurrencyError::UnknownCurrency(_) => "UNKNOWN_CURRENCY",
            CurrencyError::InvalidPairKey(_) => "INVALID_PAIR_KEY",
        }
    }
}

/// Result type alias for currency operations.
pub type Result<T> = std::result::Result<T, CurrencyError>;
