//! Batch execution module
//!
//! Splits a plan into requests of at most ten records and sends them,
//! collecting one terminal outcome per operation.
//!
//! # Behavior
//!
//! - **Ordering**: kinds run in plan order with a full barrier between them
//! - **Concurrency**: batches of one kind share a configurable budget
//! - **Partial failure**: a failed batch fails only its own operations
//! - **Cancellation**: batches not yet started end as not attempted

mod batcher;
mod types;

pub use batcher::{split_batches, Batch, RecordBatcher};
pub use types::{BatchResult, Outcome};

#[cfg(test)]
mod tests;
