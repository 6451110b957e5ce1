//! State management module
//!
//! Persists the outcome of past runs so the next run (and the operator)
//! can see what happened.
//!
//! # Overview
//!
//! The state module provides:
//! - `State` - Per-table run history
//! - `StateManager` - File-based state persistence with atomic writes

mod manager;
mod types;

pub use manager::StateManager;
pub use types::{State, TableState, HISTORY_LIMIT};
