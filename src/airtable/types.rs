//! Airtable wire types
//!
//! Request and response bodies of the metadata and records APIs. Only the
//! parts the engine reads are modelled; unknown keys are ignored.

use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};

/// Response of `GET /v0/meta/bases/{base}/tables`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TableList {
    /// Tables of the base
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

/// A table as described by the metadata API
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// Table id (`tbl...`)
    pub id: String,
    /// Table name
    pub name: String,
    /// Id of the primary field
    #[serde(default)]
    pub primary_field_id: Option<String>,
    /// Fields, primary first
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl TableSchema {
    /// Find a field by name
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether this table matches a name or id reference
    pub fn matches(&self, reference: &str) -> bool {
        self.id == reference || self.name == reference
    }
}

/// A field as described by the metadata API
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldSchema {
    /// Field id (`fld...`)
    pub id: String,
    /// Field name
    pub name: String,
    /// Airtable type name; may be a computed type
    #[serde(rename = "type")]
    pub field_type: String,
    /// Type-specific options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<JsonValue>,
}

impl FieldSchema {
    /// Names of the select choices, if any
    pub fn choice_names(&self) -> Vec<String> {
        self.options
            .as_ref()
            .and_then(|o| o.get("choices"))
            .and_then(JsonValue::as_array)
            .map(|choices| {
                choices
                    .iter()
                    .filter_map(|c| c.get("name").and_then(JsonValue::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Body of a create-field request, and of each field in a create-table request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewField {
    /// Field name
    pub name: String,
    /// Airtable type name
    #[serde(rename = "type")]
    pub field_type: String,
    /// Type-specific options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<JsonValue>,
}

/// Body of a create-table request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTable {
    /// Table name
    pub name: String,
    /// Fields; the first becomes the primary field
    pub fields: Vec<NewField>,
}

/// A record returned by the records API
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    /// Record id (`rec...`)
    pub id: String,
    /// Creation timestamp
    #[serde(default)]
    pub created_time: Option<String>,
    /// Field values keyed by field id or name, depending on the request
    #[serde(default)]
    pub fields: JsonObject,
}

/// One page of `GET /v0/{base}/{table}`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecordPage {
    /// Records on this page
    #[serde(default)]
    pub records: Vec<RemoteRecord>,
    /// Token for the next page; absent on the last page
    #[serde(default)]
    pub offset: Option<String>,
}

/// Response of create and update requests
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecordList {
    /// Records written
    #[serde(default)]
    pub records: Vec<RemoteRecord>,
}

/// One entry of a delete response
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeletedRecord {
    /// Record id
    pub id: String,
    /// Whether the record was deleted
    #[serde(default)]
    pub deleted: bool,
}

/// Response of a delete request
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeletedList {
    /// Deleted records
    #[serde(default)]
    pub records: Vec<DeletedRecord>,
}

/// Record fields to write, keyed by field id
pub type FieldValues = JsonObject;

/// A record to update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordUpdate {
    /// Record id
    pub id: String,
    /// Fields to overwrite
    pub fields: FieldValues,
}
