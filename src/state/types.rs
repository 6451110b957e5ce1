//! State types for tracking past runs
//!
//! These types are serialized to JSON and persisted between runs.

use crate::engine::{RunOutcome, RunSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Runs kept per table
pub const HISTORY_LIMIT: usize = 20;

/// Complete run state of the tool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    /// Per-table state, keyed by `base/table`
    #[serde(default)]
    pub tables: BTreeMap<String, TableState>,
}

impl State {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// State key for a table
    pub fn key(base_id: &str, table: &str) -> String {
        format!("{base_id}/{table}")
    }

    /// Get state for a table
    pub fn get_table(&self, key: &str) -> Option<&TableState> {
        self.tables.get(key)
    }

    /// Get mutable state for a table, creating if needed
    pub fn get_table_mut(&mut self, key: &str) -> &mut TableState {
        self.tables.entry(key.to_string()).or_default()
    }

    /// Most recent run against a table
    pub fn last_run(&self, key: &str) -> Option<&RunSummary> {
        self.tables.get(key)?.history.last()
    }
}

/// Runs against one destination table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableState {
    /// Past runs, oldest first
    #[serde(default)]
    pub history: Vec<RunSummary>,

    /// Start of the last successful run
    #[serde(default)]
    pub last_success_at: Option<DateTime<Utc>>,
}

impl TableState {
    /// Append a run, dropping the oldest beyond [`HISTORY_LIMIT`]
    pub fn record(&mut self, summary: RunSummary) {
        if summary.outcome == RunOutcome::Success && !summary.dry_run {
            self.last_success_at = Some(summary.started_at);
        }
        self.history.push(summary);
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(outcome: RunOutcome, inserted: usize) -> RunSummary {
        let mut summary = RunSummary::new("Contacts", inserted);
        summary.inserted = inserted;
        summary.outcome = outcome;
        summary
    }

    #[test]
    fn test_state_default() {
        let state = State::new();
        assert!(state.tables.is_empty());
        assert!(state.last_run("appX/Contacts").is_none());
    }

    #[test]
    fn test_record_tracks_last_success() {
        let mut table = TableState::default();
        table.record(summary(RunOutcome::Partial, 1));
        assert!(table.last_success_at.is_none());

        let ok = summary(RunOutcome::Success, 2);
        let started = ok.started_at;
        table.record(ok);
        assert_eq!(table.last_success_at, Some(started));
        assert_eq!(table.history.len(), 2);
    }

    #[test]
    fn test_dry_run_is_not_a_success() {
        let mut table = TableState::default();
        let mut dry = summary(RunOutcome::Success, 0);
        dry.dry_run = true;
        table.record(dry);
        assert!(table.last_success_at.is_none());
    }

    #[test]
    fn test_history_is_capped() {
        let mut table = TableState::default();
        for i in 0..HISTORY_LIMIT + 5 {
            table.record(summary(RunOutcome::Success, i));
        }
        assert_eq!(table.history.len(), HISTORY_LIMIT);
        assert_eq!(table.history[0].inserted, 5);
    }

    #[test]
    fn test_state_serialization() {
        let mut state = State::new();
        let key = State::key("appX", "Contacts");
        state.get_table_mut(&key).record(summary(RunOutcome::Success, 3));

        let json = serde_json::to_string(&state).unwrap();
        let restored: State = serde_json::from_str(&json).unwrap();

        let last = restored.last_run(&key).unwrap();
        assert_eq!(last.inserted, 3);
        assert_eq!(last.outcome, RunOutcome::Success);
    }
}
