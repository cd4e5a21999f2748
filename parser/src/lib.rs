//! ValutaTrade Parser
//!
//! Command-line front end over the rates subsystem: manual and scheduled
//! rate updates, cached lookups and listings.

pub mod cli;
pub mod commands;
pub mod logging;

pub use cli::{Cli, Command, SourceArg};
pub use commands::{render_error, App};
pub use logging::init_logging;
