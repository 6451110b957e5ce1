//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Airtable sync CLI
#[derive(Parser, Debug)]
#[command(name = "airtable-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (JSON or YAML)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// State file (JSON)
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync a CSV file into the destination table
    Run {
        /// Input CSV file (header row required)
        #[arg(short, long)]
        input: PathBuf,

        /// Write the job log CSV here (defaults to next to the state file)
        #[arg(long)]
        job_log: Option<PathBuf>,

        /// Reconcile and plan without writing anything
        #[arg(long)]
        dry_run: bool,

        /// CSV field delimiter
        #[arg(long, default_value = ",")]
        delimiter: char,
    },

    /// Test connection to the base and find the destination table
    Check,

    /// Print the planned operations without writing
    Plan {
        /// Input CSV file (header row required)
        #[arg(short, long)]
        input: PathBuf,

        /// CSV field delimiter
        #[arg(long, default_value = ",")]
        delimiter: char,
    },

    /// Validate the configuration file
    Validate,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
