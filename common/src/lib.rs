//! ValutaTrade Common Types
//!
//! Shared types used across ValutaTrade crates: validated currency codes,
//! the supported-currency registry, directional pair keys and timestamp
//! helpers.

pub mod currency;
pub mod pair;
pub mod error;
pub mod time;

pub use currency::*;
pub use pair::*;
pub use error::*;
pub use time::*;
