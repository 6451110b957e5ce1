// Allow common clippy pedantic lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]

//! Airtable sync CLI
//!
//! Command-line interface for loading CSV files into Airtable

use airtable_sync::cli::{Cli, Runner};
use airtable_sync::config::Configuration;
use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Debug logging from the flag or the configuration file
    let debug = cli.verbose
        || cli
            .config
            .as_ref()
            .and_then(|path| Configuration::from_file(path).ok())
            .is_some_and(|config| config.debug);
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let runner = Runner::new(cli);
    let succeeded = runner.run().await.context("airtable-sync failed")?;
    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
