//! Engine types
//!
//! Run phases, outcomes and the summary a run produces.

use crate::batch::{BatchResult, Outcome};
use crate::error::ErrorCategory;
use crate::plan::{OperationKind, PlanCounts, RejectedRow};
use crate::schema::SchemaChanges;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a run is, or where it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    /// Settings not yet checked
    Init,
    /// Making the destination table fit the mapping
    SchemaReconcile,
    /// Mapping rows and building the plan
    Plan,
    /// Writing batches
    Execute,
    /// Finished, possibly with failed operations
    Done,
    /// Stopped by a fatal error
    Failed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::Init => "INIT",
            RunPhase::SchemaReconcile => "SCHEMA_RECONCILE",
            RunPhase::Plan => "PLAN",
            RunPhase::Execute => "EXECUTE",
            RunPhase::Done => "DONE",
            RunPhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    /// Every operation applied
    Success,
    /// Some operations applied, others failed or were not attempted
    Partial,
    /// Fatal error before any write, or every operation failed
    Failed,
}

impl RunOutcome {
    /// Outcome for the given terminal counts
    ///
    /// A run cancelled before any write is partial, not failed: nothing
    /// went wrong with the operations themselves.
    pub fn from_counts(succeeded: usize, failed: usize, not_attempted: usize) -> Self {
        if failed == 0 && not_attempted == 0 {
            RunOutcome::Success
        } else if succeeded == 0 && failed > 0 && not_attempted == 0 {
            RunOutcome::Failed
        } else {
            RunOutcome::Partial
        }
    }

    /// Whether the run counts as successful
    pub fn is_success(self) -> bool {
        self == RunOutcome::Success
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunOutcome::Success => "SUCCESS",
            RunOutcome::Partial => "PARTIAL",
            RunOutcome::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Counters and errors of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Destination table
    pub table: String,
    /// Input rows
    pub total: usize,
    /// Records inserted
    pub inserted: usize,
    /// Records updated
    pub updated: usize,
    /// Records deleted
    pub deleted: usize,
    /// Operations and rows that failed
    pub failed: usize,
    /// Operations skipped because the run was cancelled
    pub not_attempted: usize,
    /// First error message per category
    pub first_error: BTreeMap<ErrorCategory, String>,
    /// Overall outcome
    pub outcome: RunOutcome,
    /// Phase the run ended in
    pub phase: RunPhase,
    /// Planned operations, when planning completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned: Option<PlannedCounts>,
    /// Whether remote data was left untouched on purpose
    #[serde(default)]
    pub dry_run: bool,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run duration in milliseconds
    pub duration_ms: u64,
}

impl RunSummary {
    /// Empty summary for a run that is starting
    pub fn new(table: impl Into<String>, total: usize) -> Self {
        Self {
            table: table.into(),
            total,
            inserted: 0,
            updated: 0,
            deleted: 0,
            failed: 0,
            not_attempted: 0,
            first_error: BTreeMap::new(),
            outcome: RunOutcome::Success,
            phase: RunPhase::Init,
            planned: None,
            dry_run: false,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Operations applied
    pub fn succeeded(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }

    /// Record an error unless its category already has one
    pub fn note_error(&mut self, category: ErrorCategory, message: impl Into<String>) {
        self.first_error.entry(category).or_insert_with(|| message.into());
    }

    /// Count rows rejected before planning
    pub fn add_rejected(&mut self, rejected: &[RejectedRow]) {
        self.failed += rejected.len();
        for row in rejected {
            self.note_error(
                row.error.category(),
                format!("row {}: {}", row.row_number, row.error),
            );
        }
    }

    /// Count one operation result
    pub fn add_result(&mut self, result: &BatchResult) {
        match &result.outcome {
            Outcome::Succeeded => match result.kind {
                OperationKind::Insert => self.inserted += 1,
                OperationKind::Update => self.updated += 1,
                OperationKind::Delete => self.deleted += 1,
            },
            Outcome::Failed { category, message } => {
                self.failed += 1;
                self.note_error(*category, message.clone());
            }
            Outcome::NotAttempted => self.not_attempted += 1,
        }
    }
}

/// Planned operation counts, recorded on the summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedCounts {
    /// Planned deletes
    pub deletes: usize,
    /// Planned inserts
    pub inserts: usize,
    /// Planned updates
    pub updates: usize,
}

impl From<PlanCounts> for PlannedCounts {
    fn from(counts: PlanCounts) -> Self {
        Self {
            deletes: counts.deletes,
            inserts: counts.inserts,
            updates: counts.updates,
        }
    }
}

impl PlannedCounts {
    /// Total planned operations
    pub fn total(&self) -> usize {
        self.deletes + self.inserts + self.updates
    }
}

/// One line of the job log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobLogEntry {
    /// When the outcome was decided
    pub datetime: String,
    /// Remote record id, empty when none exists
    pub record_id: String,
    /// `insert`, `update`, `delete`, or `validate` for rejected rows
    pub operation: String,
    /// `success`, `failed` or `not_attempted`
    pub status: String,
    /// Error message, empty on success
    pub error: String,
}

impl JobLogEntry {
    /// Entry for an executed (or skipped) operation
    pub fn from_result(result: &BatchResult) -> Self {
        Self {
            datetime: result.at.to_rfc3339(),
            record_id: result.remote_id.clone().unwrap_or_default(),
            operation: result.kind.to_string(),
            status: result.outcome.status().to_string(),
            error: result.error().unwrap_or_default().to_string(),
        }
    }

    /// Entry for a row rejected during coercion
    pub fn from_rejected(row: &RejectedRow, at: DateTime<Utc>) -> Self {
        Self {
            datetime: at.to_rfc3339(),
            record_id: String::new(),
            operation: "validate".to_string(),
            status: "failed".to_string(),
            error: format!("row {}: {}", row.row_number, row.error),
        }
    }
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunReport {
    /// Counters and outcome
    pub summary: RunSummary,
    /// What reconciliation changed (or would change)
    pub schema_changes: SchemaChanges,
    /// Per-operation results in plan order
    pub results: Vec<BatchResult>,
    /// Rows rejected during coercion
    pub rejected: Vec<RejectedRow>,
}

impl RunReport {
    /// Job log: rejected rows first, then one entry per operation
    pub fn job_log(&self) -> Vec<JobLogEntry> {
        let at = self.summary.started_at;
        self.rejected
            .iter()
            .map(|row| JobLogEntry::from_rejected(row, at))
            .chain(self.results.iter().map(JobLogEntry::from_result))
            .collect()
    }

    /// Write the job log as CSV
    pub fn write_job_log<W: std::io::Write>(&self, writer: W) -> crate::error::Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        for entry in self.job_log() {
            csv.serialize(entry)?;
        }
        csv.flush()?;
        Ok(())
    }
}
