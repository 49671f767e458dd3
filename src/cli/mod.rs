//! CLI interface module
//!
//! Command definitions (`types`), subcommand implementations
//! (`commands`), and shared human/JSON output formatting (`output`).

pub mod commands;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};
