//! Schema reconciliation module
//!
//! Makes the destination table able to accept the column mapping before any
//! record is written.
//!
//! # Features
//!
//! - **Table creation**: upsert-key columns first, primary type fallback
//! - **Field creation**: missing fields created with options read off the data
//! - **Type checks**: mismatching or computed fields stop the run
//! - **Choice report**: select options the data will add on write

mod inference;
mod reconciler;
mod types;

pub use inference::{
    decimal_places, FieldOptionsInferrer, DEFAULT_CURRENCY_PRECISION, MAX_PRECISION,
};
pub use reconciler::SchemaReconciler;
pub use types::{FieldBinding, SchemaChanges, TableBinding};
