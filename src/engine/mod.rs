//! Sync engine module
//!
//! Drives one run: reconcile the schema, plan, execute, summarize.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SyncOrchestrator` - Runs the phases against an [`AirtableApi`]
//! - `RunSummary` / `RunReport` - Counters, outcome and per-operation results
//! - `JobLogEntry` - One line of the CSV job log
//!
//! Only the execute phase writes records. Fatal errors stop the run with
//! [`RunOutcome::Failed`]; per-operation failures are counted and the run
//! carries on.

mod types;

pub use types::{
    JobLogEntry, PlannedCounts, RunOutcome, RunPhase, RunReport, RunSummary,
};

use crate::airtable::AirtableApi;
use crate::batch::RecordBatcher;
use crate::config::SyncSettings;
use crate::error::{Error, ErrorCategory, Result};
use crate::plan::{LoadPlanner, RecordMapper, RemoteIndex, SyncPlan};
use crate::schema::{SchemaChanges, SchemaReconciler, TableBinding};
use crate::source::SourceRow;
use crate::types::LoadType;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs a sync from source rows to the destination table
pub struct SyncOrchestrator<'a> {
    api: &'a dyn AirtableApi,
    settings: &'a SyncSettings,
    dry_run: bool,
    cancel: CancellationToken,
}

impl<'a> SyncOrchestrator<'a> {
    /// Create an orchestrator
    pub fn new(api: &'a dyn AirtableApi, settings: &'a SyncSettings) -> Self {
        Self {
            api,
            settings,
            dry_run: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Plan without creating tables, fields or records
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Stop starting new batches once this token is cancelled
    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run every phase and summarize
    ///
    /// Never returns an error: fatal errors end up in the summary with the
    /// phase they happened in. A cancel or timeout before EXECUTE ends the
    /// run as PARTIAL with nothing attempted.
    pub async fn run(&self, rows: &[SourceRow]) -> RunReport {
        let start = Instant::now();
        let cancel = self.cancel.child_token();
        let _stop_timer = cancel.clone().drop_guard();
        if let Some(timeout) = self.settings.run_timeout {
            spawn_timeout(cancel.clone(), timeout);
        }

        let mut report = RunReport {
            summary: RunSummary::new(&self.settings.table_name, rows.len()),
            schema_changes: SchemaChanges::default(),
            results: Vec::new(),
            rejected: Vec::new(),
        };
        report.summary.dry_run = self.dry_run;
        info!(
            "Starting {} of {} rows into '{}'{}",
            self.settings.load_type,
            rows.len(),
            self.settings.table_name,
            if self.dry_run { " (dry run)" } else { "" }
        );

        if let Err(error) = self.run_phases(rows, &cancel, &mut report).await {
            if cancel.is_cancelled() && error.category() != ErrorCategory::Configuration {
                stop_before_execute(&mut report, &error);
            } else {
                error!("Run failed during {}: {error}", report.summary.phase);
                report.summary.note_error(error.category(), error.to_string());
                report.summary.phase = RunPhase::Failed;
                report.summary.outcome = RunOutcome::Failed;
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        report.summary.duration_ms = duration_ms;
        let summary = &report.summary;
        info!(
            "Run {}: {} inserted, {} updated, {} deleted, {} failed, {} not attempted",
            summary.outcome,
            summary.inserted,
            summary.updated,
            summary.deleted,
            summary.failed,
            summary.not_attempted
        );
        report
    }

    async fn run_phases(
        &self,
        rows: &[SourceRow],
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<()> {
        self.settings.check()?;

        enter(report, RunPhase::SchemaReconcile);
        let binding = SchemaReconciler::new(self.api)
            .create_missing(self.settings.create_table)
            .dry_run(self.dry_run)
            .coercion(self.settings.coercion.clone())
            .cancel_on(cancel.clone())
            .reconcile(&self.settings.table_name, &self.settings.mappings, rows)
            .await?;
        report.schema_changes = binding.changes.clone();

        enter(report, RunPhase::Plan);
        let plan = self.plan_with(rows, &binding, Some(cancel)).await?;
        report.summary.planned = Some(plan.counts().into());
        report.summary.add_rejected(&plan.rejected);

        if self.dry_run {
            let planned = plan.operations.len();
            report.summary.outcome =
                RunOutcome::from_counts(planned, report.summary.failed, 0);
            report.rejected = plan.rejected;
            enter(report, RunPhase::Done);
            return Ok(());
        }

        enter(report, RunPhase::Execute);
        let results = RecordBatcher::new(self.api, &binding)
            .records_per_request(self.settings.records_per_request)
            .concurrency(self.settings.concurrency)
            .cancel_on(cancel.clone())
            .execute(&plan)
            .await;
        for result in &results {
            report.summary.add_result(result);
        }
        if report.summary.not_attempted > 0 {
            warn!(
                "Run cancelled: {} operations were not attempted",
                report.summary.not_attempted
            );
        }

        let summary = &mut report.summary;
        summary.outcome =
            RunOutcome::from_counts(summary.succeeded(), summary.failed, summary.not_attempted);
        report.results = results;
        report.rejected = plan.rejected;
        enter(report, RunPhase::Done);
        Ok(())
    }

    /// Map the rows and classify them for the load type
    pub async fn plan(&self, rows: &[SourceRow], binding: &TableBinding) -> Result<SyncPlan> {
        self.plan_with(rows, binding, None).await
    }

    async fn plan_with(
        &self,
        rows: &[SourceRow],
        binding: &TableBinding,
        cancel: Option<&CancellationToken>,
    ) -> Result<SyncPlan> {
        let settings = self.settings;
        let mapped = RecordMapper::new(&settings.mappings, settings.coercion.clone())
            .with_binding(binding)
            .chunk_size(settings.batch_size)
            .map_all(rows)?;

        let key_fields = settings.upsert_key_fields();
        let index = match settings.load_type {
            LoadType::Append => None,
            LoadType::FullLoad => Some(self.remote_index(binding, &[], cancel).await?),
            LoadType::Incremental => {
                Some(self.remote_index(binding, &key_fields, cancel).await?)
            }
        };

        LoadPlanner::new(settings.load_type, key_fields).plan(mapped, index.as_ref())
    }

    async fn remote_index(
        &self,
        binding: &TableBinding,
        key_fields: &[&str],
        cancel: Option<&CancellationToken>,
    ) -> Result<RemoteIndex> {
        if binding.is_pending() {
            debug!("Table '{}' does not exist yet; nothing to index", binding.table_name);
            return Ok(RemoteIndex::new());
        }
        // Without key fields only the record ids matter
        let mut field_ids = binding.existing_field_ids();
        if key_fields.is_empty() {
            field_ids.truncate(1);
        }
        let records = self
            .api
            .list_all_records(&binding.table_id, &field_ids, cancel.cloned())
            .await?;
        let index = RemoteIndex::from_records(
            &records,
            binding,
            key_fields,
            &self.settings.coercion.multiselect_delimiter,
        );
        info!(
            "Indexed {} existing records ({} duplicate keys)",
            index.len(),
            index.duplicate_count()
        );
        Ok(index)
    }
}

/// Convenience wrapper: run with default options
pub async fn run_sync(
    api: &dyn AirtableApi,
    settings: &SyncSettings,
    rows: &[SourceRow],
) -> RunReport {
    SyncOrchestrator::new(api, settings).run(rows).await
}

/// End a run cancelled before EXECUTE: nothing was written, so every
/// operation the rows would have produced is not attempted
fn stop_before_execute(report: &mut RunReport, error: &Error) {
    let summary = &mut report.summary;
    warn!("Run cancelled during {}: {error}", summary.phase);
    if !matches!(error, Error::Cancelled) {
        summary.note_error(error.category(), error.to_string());
    }
    summary.not_attempted = summary
        .planned
        .as_ref()
        .map_or(summary.total, PlannedCounts::total);
    summary.outcome = RunOutcome::Partial;
    summary.phase = RunPhase::Done;
}

fn enter(report: &mut RunReport, phase: RunPhase) {
    debug!("{} -> {phase}", report.summary.phase);
    report.summary.phase = phase;
}

fn spawn_timeout(token: CancellationToken, timeout: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            () = tokio::time::sleep(timeout) => {
                warn!("Run timeout of {}s reached; no new batches will start", timeout.as_secs());
                token.cancel();
            }
            () = token.cancelled() => {}
        }
    });
}
