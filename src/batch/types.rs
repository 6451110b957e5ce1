//! Batch execution results

use crate::error::{Error, ErrorCategory};
use crate::plan::{Operation, OperationKind};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Terminal state of one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Applied remotely
    Succeeded,
    /// Rejected locally or by the API
    Failed {
        /// Error category
        category: ErrorCategory,
        /// Error message
        message: String,
    },
    /// Never sent because the run was cancelled
    NotAttempted,
}

impl Outcome {
    /// Failure outcome for an error
    pub fn failed(error: &Error) -> Self {
        Self::Failed {
            category: error.category(),
            message: error.to_string(),
        }
    }

    /// Short status label
    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "success",
            Outcome::Failed { .. } => "failed",
            Outcome::NotAttempted => "not_attempted",
        }
    }
}

/// Outcome of one operation within its batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// Operation kind
    pub kind: OperationKind,
    /// Input row, for inserts and updates
    pub row_number: Option<usize>,
    /// Record targeted, or created by a successful insert
    pub remote_id: Option<String>,
    /// Batch the operation was sent in
    pub batch: usize,
    /// How it ended
    pub outcome: Outcome,
    /// When the outcome was decided
    pub at: DateTime<Utc>,
}

impl BatchResult {
    /// Result for an operation
    pub fn new(operation: &Operation, batch: usize, outcome: Outcome) -> Self {
        Self {
            kind: operation.kind(),
            row_number: operation.row_number(),
            remote_id: operation.remote_id().map(str::to_string),
            batch,
            outcome,
            at: Utc::now(),
        }
    }

    /// Set the remote id created by an insert
    #[must_use]
    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    /// Whether the operation was applied
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    /// Error message, when the operation failed
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Failed { message, .. } => Some(message),
            _ => None,
        }
    }
}
