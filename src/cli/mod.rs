//! CLI module
//!
//! Command-line interface for running syncs.
//!
//! # Commands
//!
//! - `run` - Sync a CSV file into the destination table
//! - `check` - Test connection to the base
//! - `plan` - Show planned operations without writing
//! - `validate` - Validate the configuration file

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
