// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # airtable-sync
//!
//! A rate-limited, batch-aware engine that loads tabular rows into an
//! Airtable table.
//!
//! ## Features
//!
//! - **Three load types**: Append, Full Load (replace) and Incremental Load (upsert)
//! - **Schema reconciliation**: missing tables and fields are created from the mapping
//! - **Typed coercion**: every writable Airtable field type, validated per row
//! - **API limits**: batches of at most 10 records, token-bucket pacing, retry with backoff
//! - **Partial failure**: one outcome per operation, summarized as SUCCESS / PARTIAL / FAILED
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use airtable_sync::{AirtableClient, Configuration, CsvSourceReader, SyncOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> airtable_sync::Result<()> {
//!     let settings = Configuration::from_file("config.yaml")?.with_env_token().validate()?;
//!     let columns: Vec<&str> = settings.mappings.iter().map(|m| m.source_name.as_str()).collect();
//!     let rows = CsvSourceReader::new("contacts.csv").read(&columns)?;
//!
//!     let client = AirtableClient::from_settings(&settings)?;
//!     let report = SyncOrchestrator::new(&client, &settings).run(&rows).await;
//!     println!("{}: {} inserted", report.summary.outcome, report.summary.inserted);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SyncOrchestrator                         │
//! │  INIT → SCHEMA_RECONCILE → PLAN → EXECUTE → DONE (or FAILED)    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬───────────┬─────────────┐
//! │  Coerce  │  Schema   │     Plan      │   Batch   │  Airtable   │
//! ├──────────┼───────────┼───────────────┼───────────┼─────────────┤
//! │ Checkbox │ Tables    │ Append        │ ≤10/req   │ Metadata    │
//! │ Numbers  │ Fields    │ Full Load     │ Barriers  │ Records     │
//! │ Dates    │ Primary   │ Incremental   │ Cancel    │ Retry       │
//! │ Selects  │ Choices   │ Upsert keys   │ Outcomes  │ Rate Limit  │
//! └──────────┴───────────┴───────────────┴───────────┴─────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for airtable-sync
pub mod error;

/// Common types and type aliases
pub mod types;

/// HTTP client with retry and rate limiting
pub mod http;

/// Airtable Web API client
pub mod airtable;

/// Configuration file and validated settings
pub mod config;

/// Source value coercion
pub mod coerce;

/// CSV source reader
pub mod source;

/// Destination schema reconciliation
pub mod schema;

/// Load planning
pub mod plan;

/// Batch execution
pub mod batch;

/// Run orchestration
pub mod engine;

/// Run state persistence
pub mod state;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, ErrorCategory, Result};
pub use types::*;

// Re-export commonly used types
pub use airtable::{AirtableApi, AirtableClient};
pub use config::{ColumnMapping, Configuration, SyncSettings};
pub use engine::{RunOutcome, RunReport, RunSummary, SyncOrchestrator};
pub use source::{CsvSourceReader, SourceRow};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
