//! Reconciled destination schema

use crate::types::FieldType;
use serde::Serialize;
use std::collections::BTreeMap;

/// A mapped destination field resolved against the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldBinding {
    /// Destination field name
    pub name: String,
    /// Airtable field id; empty while the field only exists in a dry run
    pub field_id: String,
    /// Type values are coerced to
    pub field_type: FieldType,
    /// Select choices known to the table
    pub choices: Vec<String>,
}

impl FieldBinding {
    /// Whether the field does not exist remotely yet
    pub fn is_pending(&self) -> bool {
        self.field_id.is_empty()
    }
}

/// What reconciliation changed, or would change in a dry run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaChanges {
    /// The table was created
    pub created_table: bool,
    /// Fields created on an existing table
    pub created_fields: Vec<String>,
    /// Select options present in the data but not yet in the table
    pub new_choices: BTreeMap<String, Vec<String>>,
    /// Field whose declared type was replaced by singleLineText as primary
    pub primary_fallback: Option<String>,
}

impl SchemaChanges {
    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        !self.created_table
            && self.created_fields.is_empty()
            && self.new_choices.is_empty()
            && self.primary_fallback.is_none()
    }
}

/// The destination table with every mapped field resolved to an id
///
/// Fields are kept in mapping order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableBinding {
    /// Table id; empty while the table only exists in a dry run
    pub table_id: String,
    /// Table name
    pub table_name: String,
    /// Bound fields
    pub fields: Vec<FieldBinding>,
    /// Changes made while reconciling
    pub changes: SchemaChanges,
}

impl TableBinding {
    /// Look up a field by destination name
    pub fn field(&self, name: &str) -> Option<&FieldBinding> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field id of a destination name
    pub fn field_id(&self, name: &str) -> Option<&str> {
        self.field(name)
            .filter(|f| !f.is_pending())
            .map(|f| f.field_id.as_str())
    }

    /// Effective field type of a destination name
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.field(name).map(|f| f.field_type)
    }

    /// Ids of all fields that exist remotely
    pub fn existing_field_ids(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !f.is_pending())
            .map(|f| f.field_id.clone())
            .collect()
    }

    /// Whether the table does not exist remotely yet
    pub fn is_pending(&self) -> bool {
        self.table_id.is_empty()
    }
}
