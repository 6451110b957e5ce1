//! CLI runner - executes commands

use crate::airtable::{AirtableApi, AirtableClient};
use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::{Configuration, SyncSettings};
use crate::engine::{RunOutcome, RunReport, SyncOrchestrator};
use crate::error::{Error, Result, ResultExt};
use crate::source::{CsvSourceReader, SourceRow};
use crate::state::StateManager;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Job log file name used next to the state file
const JOB_LOG_FILE: &str = "job_log.csv";

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command; `Ok(true)` only when the command fully succeeded
    pub async fn run(&self) -> Result<bool> {
        match &self.cli.command {
            Commands::Run {
                input,
                job_log,
                dry_run,
                delimiter,
            } => {
                self.sync(input, job_log.as_deref(), *dry_run, *delimiter)
                    .await
            }
            Commands::Check => self.check().await,
            Commands::Plan { input, delimiter } => self.plan(input, *delimiter).await,
            Commands::Validate => self.validate(),
        }
    }

    /// Load and validate the configuration file
    fn load_settings(&self) -> Result<SyncSettings> {
        let path = self
            .cli
            .config
            .as_ref()
            .ok_or_else(|| Error::config("Configuration file not specified (use --config)"))?;
        Configuration::from_file(path)?.with_env_token().validate()
    }

    /// Read the mapped columns of the input file
    fn read_rows(settings: &SyncSettings, input: &Path, delimiter: char) -> Result<Vec<SourceRow>> {
        let delimiter = u8::try_from(delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| Error::invalid_value("delimiter", "must be a single ASCII character"))?;
        let columns: Vec<&str> = settings
            .mappings
            .iter()
            .map(|m| m.source_name.as_str())
            .collect();
        let rows = CsvSourceReader::new(input)
            .delimiter(delimiter)
            .read(&columns)?;
        info!("Read {} rows from {}", rows.len(), input.display());
        Ok(rows)
    }

    /// Sync the input file
    async fn sync(
        &self,
        input: &Path,
        job_log: Option<&Path>,
        dry_run: bool,
        delimiter: char,
    ) -> Result<bool> {
        let settings = self.load_settings()?;
        let rows = Self::read_rows(&settings, input, delimiter)?;
        let client = AirtableClient::from_settings(&settings)?;

        let cancel = CancellationToken::new();
        spawn_interrupt_handler(cancel.clone());

        let report = SyncOrchestrator::new(&client, &settings)
            .dry_run(dry_run)
            .cancel_on(cancel)
            .run(&rows)
            .await;

        if let Some(path) = self.job_log_path(job_log) {
            write_job_log(&report, &path)?;
        }
        if let Some(path) = &self.cli.state {
            let state = StateManager::from_file(path)?;
            state.record_run(&settings.base_id, &report.summary).await?;
        }

        self.output_message(&json!({
            "type": "SUMMARY",
            "summary": report.summary,
            "schemaChanges": report.schema_changes,
        }));
        Ok(report.summary.outcome.is_success())
    }

    /// Print the plan for the input file
    async fn plan(&self, input: &Path, delimiter: char) -> Result<bool> {
        let settings = self.load_settings()?;
        let rows = Self::read_rows(&settings, input, delimiter)?;
        let client = AirtableClient::from_settings(&settings)?;

        let report = SyncOrchestrator::new(&client, &settings)
            .dry_run(true)
            .run(&rows)
            .await;

        let rejected: Vec<Value> = report
            .rejected
            .iter()
            .map(|row| json!({ "row": row.row_number, "error": row.error.to_string() }))
            .collect();
        self.output_message(&json!({
            "type": "PLAN",
            "loadType": settings.load_type,
            "plan": report.summary.planned,
            "schemaChanges": report.schema_changes,
            "rejected": rejected,
            "errors": report.summary.first_error,
        }));
        Ok(report.summary.outcome != RunOutcome::Failed)
    }

    /// Check the connection and look for the destination table
    async fn check(&self) -> Result<bool> {
        let settings = self.load_settings()?;
        let client = AirtableClient::from_settings(&settings)?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!("Checking connection to base {}", settings.base_id)
            }
        }));

        match client.list_tables(None).await {
            Ok(tables) => {
                let found = tables.iter().any(|t| t.matches(&settings.table_name));
                let message = if found {
                    format!(
                        "Connection successful. Found {} tables including '{}'.",
                        tables.len(),
                        settings.table_name
                    )
                } else if settings.create_table {
                    format!(
                        "Connection successful. Table '{}' will be created on the first run.",
                        settings.table_name
                    )
                } else {
                    format!(
                        "Table '{}' not found and table creation is disabled.",
                        settings.table_name
                    )
                };
                let ok = found || settings.create_table;
                self.output_message(&json!({
                    "type": "CONNECTION_STATUS",
                    "connectionStatus": {
                        "status": if ok { "SUCCEEDED" } else { "FAILED" },
                        "message": message
                    }
                }));
                Ok(ok)
            }
            Err(e) => {
                self.output_message(&json!({
                    "type": "CONNECTION_STATUS",
                    "connectionStatus": {
                        "status": "FAILED",
                        "message": e.to_string()
                    }
                }));
                Ok(false)
            }
        }
    }

    /// Validate the configuration file
    fn validate(&self) -> Result<bool> {
        let settings = self.load_settings()?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Configuration is valid: {} into '{}' with {} columns",
                    settings.load_type,
                    settings.table_name,
                    settings.mappings.len()
                )
            }
        }));
        Ok(true)
    }

    /// Where to write the job log, if anywhere
    fn job_log_path(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        let state = self.cli.state.as_ref()?;
        Some(
            state
                .parent()
                .map_or_else(|| PathBuf::from(JOB_LOG_FILE), |dir| dir.join(JOB_LOG_FILE)),
        )
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

fn write_job_log(report: &RunReport, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create job log '{}'", path.display()))?;
    report.write_job_log(std::io::BufWriter::new(file))?;
    info!("Wrote job log to {}", path.display());
    Ok(())
}

/// Cancel the run on Ctrl-C; batches in flight still finish
fn spawn_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing batches in flight");
            token.cancel();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    fn runner(args: &[&str]) -> Runner {
        Runner::new(Cli::parse_from(args))
    }

    const CONFIG: &str = r##"{
        "base_id": "appX",
        "#api_token": "pat-test",
        "destination": {
            "table_name": "Contacts",
            "load_type": "Append",
            "columns": [
                {"source_name": "email", "destination_name": "Email", "dtype": "email"}
            ]
        }
    }"##;

    #[test]
    fn test_validate_reads_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, CONFIG).unwrap();

        let runner = runner(&["airtable-sync", "-C", path.to_str().unwrap(), "validate"]);
        assert!(runner.validate().unwrap());
    }

    #[test]
    fn test_missing_config_flag() {
        let runner = runner(&["airtable-sync", "validate"]);
        let err = runner.validate().unwrap_err();
        assert!(err.to_string().contains("--config"));
    }

    #[test]
    fn test_job_log_defaults_next_to_state() {
        let runner = runner(&[
            "airtable-sync",
            "--state",
            "/var/run/sync/state.json",
            "run",
            "--input",
            "rows.csv",
        ]);
        assert_eq!(
            runner.job_log_path(None),
            Some(PathBuf::from("/var/run/sync/job_log.csv"))
        );
        assert_eq!(
            runner.job_log_path(Some(Path::new("log.csv"))),
            Some(PathBuf::from("log.csv"))
        );
    }

    #[test]
    fn test_no_job_log_without_state() {
        let runner = runner(&["airtable-sync", "check"]);
        assert_eq!(runner.job_log_path(None), None);
    }

    #[test]
    fn test_read_rows_rejects_wide_delimiter() {
        let settings = Configuration::from_json(CONFIG).unwrap().validate().unwrap();
        let err = Runner::read_rows(&settings, Path::new("rows.csv"), 'é').unwrap_err();
        assert!(matches!(err, Error::InvalidConfigValue { .. }));
    }
}
