//! Common types used throughout airtable-sync
//!
//! This module contains shared type definitions, type aliases,
//! and the closed enumerations the engine dispatches on.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// Load Type
// ============================================================================

/// How rows are written to the destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LoadType {
    /// Every row is inserted as a new record
    #[default]
    #[serde(rename = "Append", alias = "append")]
    Append,
    /// The table is cleared, then every row is inserted
    #[serde(rename = "Full Load", alias = "full_load")]
    FullLoad,
    /// Rows are matched on the upsert key and updated or inserted
    #[serde(rename = "Incremental Load", alias = "incremental", alias = "incremental_load")]
    Incremental,
}

impl LoadType {
    /// Whether planning needs the existing remote records
    pub fn needs_remote_index(self) -> bool {
        matches!(self, LoadType::FullLoad | LoadType::Incremental)
    }
}

impl std::fmt::Display for LoadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadType::Append => write!(f, "Append"),
            LoadType::FullLoad => write!(f, "Full Load"),
            LoadType::Incremental => write!(f, "Incremental Load"),
        }
    }
}

// ============================================================================
// Field Type
// ============================================================================

/// Writable Airtable field types
///
/// Computed types (formula, rollup, lookup, ...) are not listed; no column
/// mapping can target them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    SingleLineText,
    MultilineText,
    RichText,
    Email,
    Url,
    PhoneNumber,
    Number,
    Currency,
    Percent,
    Rating,
    Duration,
    Checkbox,
    Date,
    DateTime,
    SingleSelect,
    MultipleSelects,
}

/// Airtable field types whose values are computed by Airtable itself
pub const COMPUTED_FIELD_TYPES: &[&str] = &[
    "formula",
    "rollup",
    "lookup",
    "multipleLookupValues",
    "count",
    "autoNumber",
    "createdTime",
    "lastModifiedTime",
    "createdBy",
    "lastModifiedBy",
    "button",
    "aiText",
];

impl FieldType {
    /// All writable field types
    pub const ALL: [FieldType; 16] = [
        FieldType::SingleLineText,
        FieldType::MultilineText,
        FieldType::RichText,
        FieldType::Email,
        FieldType::Url,
        FieldType::PhoneNumber,
        FieldType::Number,
        FieldType::Currency,
        FieldType::Percent,
        FieldType::Rating,
        FieldType::Duration,
        FieldType::Checkbox,
        FieldType::Date,
        FieldType::DateTime,
        FieldType::SingleSelect,
        FieldType::MultipleSelects,
    ];

    /// Airtable's name for this type
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::SingleLineText => "singleLineText",
            FieldType::MultilineText => "multilineText",
            FieldType::RichText => "richText",
            FieldType::Email => "email",
            FieldType::Url => "url",
            FieldType::PhoneNumber => "phoneNumber",
            FieldType::Number => "number",
            FieldType::Currency => "currency",
            FieldType::Percent => "percent",
            FieldType::Rating => "rating",
            FieldType::Duration => "duration",
            FieldType::Checkbox => "checkbox",
            FieldType::Date => "date",
            FieldType::DateTime => "dateTime",
            FieldType::SingleSelect => "singleSelect",
            FieldType::MultipleSelects => "multipleSelects",
        }
    }

    /// Whether Airtable accepts this type for a table's primary field
    pub fn can_be_primary(self) -> bool {
        matches!(
            self,
            FieldType::SingleLineText | FieldType::Email | FieldType::Url | FieldType::PhoneNumber
        )
    }

    /// Whether this type holds numeric values
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Number
                | FieldType::Currency
                | FieldType::Percent
                | FieldType::Rating
                | FieldType::Duration
        )
    }

    /// Whether this type carries a list of select choices
    pub fn has_choices(self) -> bool {
        matches!(self, FieldType::SingleSelect | FieldType::MultipleSelects)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(t) = FieldType::ALL.iter().find(|t| t.as_str() == s) {
            return Ok(*t);
        }
        if COMPUTED_FIELD_TYPES.contains(&s) {
            return Err(format!(
                "field type '{s}' is computed by Airtable and cannot be written"
            ));
        }
        Err(format!("unknown field type '{s}'"))
    }
}

/// Map a source storage type to the Airtable field type used by default
pub fn map_source_type(source_type: &str) -> FieldType {
    match source_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "NUMERIC" | "FLOAT" => FieldType::Number,
        "BOOLEAN" => FieldType::Checkbox,
        "DATE" => FieldType::Date,
        "TIMESTAMP" => FieldType::DateTime,
        _ => FieldType::SingleLineText,
    }
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_type_serde() {
        let lt: LoadType = serde_json::from_str("\"Incremental Load\"").unwrap();
        assert_eq!(lt, LoadType::Incremental);

        let lt: LoadType = serde_json::from_str("\"full_load\"").unwrap();
        assert_eq!(lt, LoadType::FullLoad);

        let json = serde_json::to_string(&LoadType::FullLoad).unwrap();
        assert_eq!(json, "\"Full Load\"");
    }

    #[test]
    fn test_load_type_needs_remote_index() {
        assert!(!LoadType::Append.needs_remote_index());
        assert!(LoadType::FullLoad.needs_remote_index());
        assert!(LoadType::Incremental.needs_remote_index());
    }

    #[test]
    fn test_field_type_round_trips_through_name() {
        for t in FieldType::ALL {
            assert_eq!(t.as_str().parse::<FieldType>().unwrap(), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn test_field_type_rejects_computed() {
        let err = "formula".parse::<FieldType>().unwrap_err();
        assert!(err.contains("computed"));

        let err = "hologram".parse::<FieldType>().unwrap_err();
        assert!(err.contains("unknown"));
    }

    #[test]
    fn test_primary_eligibility() {
        assert!(FieldType::SingleLineText.can_be_primary());
        assert!(FieldType::Email.can_be_primary());
        assert!(!FieldType::Number.can_be_primary());
        assert!(!FieldType::Checkbox.can_be_primary());
    }

    #[test]
    fn test_map_source_type() {
        assert_eq!(map_source_type("STRING"), FieldType::SingleLineText);
        assert_eq!(map_source_type("integer"), FieldType::Number);
        assert_eq!(map_source_type("FLOAT"), FieldType::Number);
        assert_eq!(map_source_type("BOOLEAN"), FieldType::Checkbox);
        assert_eq!(map_source_type("DATE"), FieldType::Date);
        assert_eq!(map_source_type("TIMESTAMP"), FieldType::DateTime);
        assert_eq!(map_source_type("GEOGRAPHY"), FieldType::SingleLineText);
    }
}
