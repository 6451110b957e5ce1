//! Load planning module
//!
//! Classifies every mapped row into an operation for the selected load type.
//!
//! # Load types
//!
//! - **Append**: every row is inserted
//! - **Full Load**: every remote record is deleted, then every row inserted
//! - **Incremental Load**: rows matching a remote record on the upsert key
//!   update it, the rest are inserted; unmatched remote records are kept

mod mapper;
mod planner;
mod types;

pub use mapper::{MappedRows, RecordMapper};
pub use planner::LoadPlanner;
pub use types::{
    key_text, MappedRecord, Operation, OperationKind, PlanCounts, RejectedRow, RemoteIndex,
    SyncPlan, UpsertKey,
};
