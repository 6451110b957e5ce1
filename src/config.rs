//! Configuration types for a sync job
//!
//! [`Configuration`] mirrors the JSON/YAML parameter file as written by the
//! user. [`Configuration::validate`] turns it into [`SyncSettings`], the
//! statically-shaped form the engine consumes. Nothing downstream reads the
//! raw file again.

use crate::error::{Error, Result};
use crate::http::{HttpClientConfig, RateLimiterConfig, AIRTABLE_REQUESTS_PER_SECOND};
use crate::types::{map_source_type, FieldType, LoadType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Airtable's hard limit on records per write request
pub const MAX_RECORDS_PER_REQUEST: usize = 10;

/// Environment variable consulted when the file carries no token
pub const API_TOKEN_ENV: &str = "AIRTABLE_API_TOKEN";

/// Default Airtable API endpoint
pub const DEFAULT_API_URL: &str = "https://api.airtable.com";

// ============================================================================
// Raw configuration (as written in the parameter file)
// ============================================================================

/// Parameter file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    /// Airtable base id (e.g. "appXXXXXXXXXXXXXX")
    #[serde(default)]
    pub base_id: String,

    /// Personal access token
    #[serde(rename = "#api_token", alias = "api_token", default)]
    pub api_token: String,

    /// Destination table and column mapping
    #[serde(default)]
    pub destination: Destination,

    /// Tuning knobs
    #[serde(default)]
    pub advanced_options: AdvancedOptions,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

/// Destination table settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    /// Table name (or table id)
    #[serde(default)]
    pub table_name: String,

    /// Ordered column mapping
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,

    /// Load semantics
    #[serde(default)]
    pub load_type: LoadType,

    /// Create the table when it does not exist
    #[serde(default = "default_true")]
    pub create_table: bool,
}

impl Default for Destination {
    fn default() -> Self {
        Self {
            table_name: String::new(),
            columns: Vec::new(),
            load_type: LoadType::default(),
            create_table: true,
        }
    }
}

/// One column of the mapping, as written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    /// Column name in the source table
    pub source_name: String,
    /// Field name in Airtable
    pub destination_name: String,
    /// Airtable field type name (e.g. "singleLineText")
    pub dtype: String,
    /// Part of the upsert key
    #[serde(default, alias = "pk")]
    pub upsert_key: bool,
}

/// Advanced options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedOptions {
    /// Rows read and planned per chunk
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Records per write request (Airtable allows at most 10)
    #[serde(default = "default_records_per_request")]
    pub records_per_request: usize,

    /// Delimiter splitting multipleSelects values
    #[serde(default = "default_delimiter")]
    pub multiselect_delimiter: String,

    /// Client-side request ceiling
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Batches of one kind dispatched concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Overall run timeout; no new batch starts after it elapses
    #[serde(default)]
    pub run_timeout_seconds: Option<u64>,

    /// API endpoint (overridable for testing)
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for AdvancedOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            records_per_request: default_records_per_request(),
            multiselect_delimiter: default_delimiter(),
            requests_per_second: default_requests_per_second(),
            max_retries: default_max_retries(),
            concurrency: default_concurrency(),
            run_timeout_seconds: None,
            api_url: default_api_url(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    1000
}

fn default_records_per_request() -> usize {
    MAX_RECORDS_PER_REQUEST
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_requests_per_second() -> u32 {
    AIRTABLE_REQUESTS_PER_SECOND
}

fn default_max_retries() -> u32 {
    5
}

fn default_concurrency() -> usize {
    1
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

// ============================================================================
// Validated configuration
// ============================================================================

/// A validated column mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Column name in the source table
    pub source_name: String,
    /// Field name in Airtable
    pub destination_name: String,
    /// Declared Airtable field type
    pub destination_type: FieldType,
    /// Part of the upsert key
    pub is_upsert_key: bool,
}

impl ColumnMapping {
    /// Create a mapping
    pub fn new(
        source_name: impl Into<String>,
        destination_name: impl Into<String>,
        destination_type: FieldType,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            destination_name: destination_name.into(),
            destination_type,
            is_upsert_key: false,
        }
    }

    /// Mark this column as part of the upsert key
    #[must_use]
    pub fn upsert_key(mut self) -> Self {
        self.is_upsert_key = true;
        self
    }
}

/// Options for value coercion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionOptions {
    /// Delimiter splitting multipleSelects values
    pub multiselect_delimiter: String,
}

impl Default for CoercionOptions {
    fn default() -> Self {
        Self {
            multiselect_delimiter: default_delimiter(),
        }
    }
}

/// Everything the engine needs, validated
#[derive(Clone)]
pub struct SyncSettings {
    /// Airtable base id
    pub base_id: String,
    /// Personal access token
    pub api_token: String,
    /// Destination table name or id
    pub table_name: String,
    /// Create the table when missing
    pub create_table: bool,
    /// Load semantics
    pub load_type: LoadType,
    /// Ordered column mapping
    pub mappings: Vec<ColumnMapping>,
    /// Coercion options
    pub coercion: CoercionOptions,
    /// Records per write request
    pub records_per_request: usize,
    /// Rows per planning chunk
    pub batch_size: usize,
    /// Concurrent batches per kind
    pub concurrency: usize,
    /// Client-side request ceiling
    pub requests_per_second: u32,
    /// Retries for transient failures
    pub max_retries: u32,
    /// Overall run timeout
    pub run_timeout: Option<Duration>,
    /// API endpoint
    pub api_url: String,
    /// Debug logging requested
    pub debug: bool,
}

impl std::fmt::Debug for SyncSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSettings")
            .field("base_id", &self.base_id)
            .field("table_name", &self.table_name)
            .field("load_type", &self.load_type)
            .field("mappings", &self.mappings)
            .field("records_per_request", &self.records_per_request)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl SyncSettings {
    /// Create settings for the given destination with default tuning
    pub fn new(
        base_id: impl Into<String>,
        api_token: impl Into<String>,
        table_name: impl Into<String>,
        load_type: LoadType,
        mappings: Vec<ColumnMapping>,
    ) -> Self {
        let defaults = AdvancedOptions::default();
        Self {
            base_id: base_id.into(),
            api_token: api_token.into(),
            table_name: table_name.into(),
            create_table: true,
            load_type,
            mappings,
            coercion: CoercionOptions::default(),
            records_per_request: defaults.records_per_request,
            batch_size: defaults.batch_size,
            concurrency: defaults.concurrency,
            requests_per_second: defaults.requests_per_second,
            max_retries: defaults.max_retries,
            run_timeout: None,
            api_url: defaults.api_url,
            debug: false,
        }
    }

    /// Point the settings at a different API endpoint
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Names of the upsert-key destination fields, in mapping order
    pub fn upsert_key_fields(&self) -> Vec<&str> {
        self.mappings
            .iter()
            .filter(|m| m.is_upsert_key)
            .map(|m| m.destination_name.as_str())
            .collect()
    }

    /// Check the invariants the engine relies on
    pub fn check(&self) -> Result<()> {
        if self.api_token.trim().is_empty() {
            return Err(Error::missing_field("#api_token"));
        }
        if self.base_id.trim().is_empty() {
            return Err(Error::missing_field("base_id"));
        }
        if self.table_name.trim().is_empty() {
            return Err(Error::missing_field("destination.table_name"));
        }
        if self.mappings.is_empty() {
            return Err(Error::config("Column configuration is required"));
        }

        let mut seen = HashSet::new();
        for mapping in &self.mappings {
            if mapping.destination_name.trim().is_empty() {
                return Err(Error::invalid_value(
                    "destination.columns",
                    format!("column '{}' has an empty destination name", mapping.source_name),
                ));
            }
            if !seen.insert(mapping.destination_name.as_str()) {
                return Err(Error::invalid_value(
                    "destination.columns",
                    format!(
                        "destination name '{}' is mapped more than once",
                        mapping.destination_name
                    ),
                ));
            }
        }

        if self.load_type == LoadType::Incremental && self.upsert_key_fields().is_empty() {
            return Err(Error::config(
                "Incremental Load requires at least one column marked as upsert key",
            ));
        }
        if self.records_per_request == 0 || self.records_per_request > MAX_RECORDS_PER_REQUEST {
            return Err(Error::invalid_value(
                "advanced_options.records_per_request",
                format!("must be between 1 and {MAX_RECORDS_PER_REQUEST}"),
            ));
        }
        if self.batch_size == 0 || self.batch_size > 10_000 {
            return Err(Error::invalid_value(
                "advanced_options.batch_size",
                "must be between 1 and 10000",
            ));
        }
        if self.concurrency == 0 {
            return Err(Error::invalid_value(
                "advanced_options.concurrency",
                "must be at least 1",
            ));
        }
        if self.requests_per_second == 0 {
            return Err(Error::invalid_value(
                "advanced_options.requests_per_second",
                "must be at least 1",
            ));
        }
        if self.coercion.multiselect_delimiter.is_empty() {
            return Err(Error::invalid_value(
                "advanced_options.multiselect_delimiter",
                "must not be empty",
            ));
        }
        Ok(())
    }

    /// HTTP client configuration derived from these settings
    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig::builder()
            .base_url(self.api_url.clone())
            .bearer_token(self.api_token.clone())
            .max_retries(self.max_retries)
            .rate_limit(RateLimiterConfig::per_second(self.requests_per_second))
            .build()
    }
}

impl Configuration {
    /// Load a configuration file; `.yaml`/`.yml` are read as YAML, anything else as JSON
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::config(format!(
                    "Failed to read config file '{}': {e}",
                    path.display()
                ))
            }
        })?;

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if is_yaml {
            Self::from_yaml(&content)
        } else {
            Self::from_json(&content)
        }
    }

    /// Parse a JSON configuration
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse a YAML configuration
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Fill the token from the environment when the file has none
    #[must_use]
    pub fn with_env_token(mut self) -> Self {
        if self.api_token.is_empty() {
            if let Ok(token) = std::env::var(API_TOKEN_ENV) {
                self.api_token = token;
            }
        }
        self
    }

    /// Validate into engine settings
    pub fn validate(self) -> Result<SyncSettings> {
        let mut mappings = Vec::with_capacity(self.destination.columns.len());
        for column in &self.destination.columns {
            let destination_type = parse_dtype(&column.dtype).map_err(|message| {
                Error::invalid_value(
                    format!("destination.columns[{}].dtype", column.source_name),
                    message,
                )
            })?;
            mappings.push(ColumnMapping {
                source_name: column.source_name.clone(),
                destination_name: column.destination_name.clone(),
                destination_type,
                is_upsert_key: column.upsert_key,
            });
        }

        let options = self.advanced_options;
        let settings = SyncSettings {
            base_id: self.base_id,
            api_token: self.api_token,
            table_name: self.destination.table_name,
            create_table: self.destination.create_table,
            load_type: self.destination.load_type,
            mappings,
            coercion: CoercionOptions {
                multiselect_delimiter: options.multiselect_delimiter,
            },
            records_per_request: options.records_per_request,
            batch_size: options.batch_size,
            concurrency: options.concurrency,
            requests_per_second: options.requests_per_second,
            max_retries: options.max_retries,
            run_timeout: options.run_timeout_seconds.map(Duration::from_secs),
            api_url: options.api_url,
            debug: self.debug,
        };
        settings.check()?;
        Ok(settings)
    }
}

/// Airtable field type name, or an upper-case source storage type
/// (STRING, INTEGER, TIMESTAMP, ...) mapped to its default field type
fn parse_dtype(dtype: &str) -> std::result::Result<FieldType, String> {
    dtype.parse().or_else(|message| {
        let is_storage_type = !dtype.is_empty()
            && dtype
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
        if is_storage_type {
            Ok(map_source_type(dtype))
        } else {
            Err(message)
        }
    })
}
