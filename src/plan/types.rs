//! Plan types

use crate::airtable::RemoteRecord;
use crate::coerce::identity_text;
use crate::error::Error;
use crate::schema::TableBinding;
use crate::types::{FieldType, JsonObject, JsonValue, LoadType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

// ============================================================================
// Records
// ============================================================================

/// Identity of a record: one text component per upsert-key column
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UpsertKey(pub Vec<String>);

impl UpsertKey {
    /// Build a key from its components
    pub fn new<S: Into<String>>(parts: impl IntoIterator<Item = S>) -> Self {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Key components in mapping order
    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for UpsertKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Key text of one wire value
///
/// This is the upsert-key identity: source rows are keyed on their coerced
/// values, not the raw text. Both sides of a match go through this, so a
/// number written as `1.50` matches the `1.5` Airtable returns. Unchecked
/// checkboxes are omitted by Airtable and read back as `false`.
pub fn key_text(wire: &JsonValue, field_type: FieldType, delimiter: &str) -> String {
    match (field_type, wire) {
        (FieldType::Checkbox, JsonValue::Null) => "false".to_string(),
        _ => identity_text(wire, delimiter),
    }
}

/// A source row coerced into destination wire values
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    /// 1-based position of the row in the input
    pub row_number: usize,
    /// Destination field name to wire value
    pub fields: JsonObject,
    /// Upsert key, when the mapping has key columns
    pub key: Option<UpsertKey>,
    /// Remote record this row updates
    pub remote_id: Option<String>,
}

impl MappedRecord {
    /// Create a record with no key
    pub fn new(row_number: usize, fields: JsonObject) -> Self {
        Self {
            row_number,
            fields,
            key: None,
            remote_id: None,
        }
    }

    /// Attach an upsert key
    #[must_use]
    pub fn with_key(mut self, key: UpsertKey) -> Self {
        self.key = Some(key);
        self
    }
}

/// A row that could not be coerced; it fails without reaching the API
#[derive(Debug)]
pub struct RejectedRow {
    /// 1-based position of the row in the input
    pub row_number: usize,
    /// Why the row was rejected
    pub error: Error,
}

// ============================================================================
// Remote index
// ============================================================================

/// Existing remote records by upsert key, plus every remote id
#[derive(Debug, Clone, Default)]
pub struct RemoteIndex {
    by_key: HashMap<UpsertKey, String>,
    record_ids: Vec<String>,
    duplicates: usize,
}

impl RemoteIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Index remote records on the given key fields
    ///
    /// When several records share a key the first one listed wins; the others
    /// are still part of [`RemoteIndex::record_ids`].
    pub fn from_records(
        records: &[RemoteRecord],
        binding: &TableBinding,
        key_fields: &[&str],
        delimiter: &str,
    ) -> Self {
        let key_columns: Vec<(Option<&str>, FieldType)> = key_fields
            .iter()
            .map(|name| {
                let field_type = binding
                    .field_type(name)
                    .unwrap_or(FieldType::SingleLineText);
                (binding.field_id(name), field_type)
            })
            .collect();

        let mut index = Self::new();
        for record in records {
            if key_columns.is_empty() {
                index.record_ids.push(record.id.clone());
                continue;
            }
            let key = UpsertKey(
                key_columns
                    .iter()
                    .map(|(field_id, field_type)| {
                        let value = field_id
                            .and_then(|id| record.fields.get(id))
                            .unwrap_or(&JsonValue::Null);
                        key_text(value, *field_type, delimiter)
                    })
                    .collect(),
            );
            index.insert(key, record.id.clone());
        }
        if index.duplicates > 0 {
            warn!(
                "{} remote records share an upsert key with an earlier record; the first match is updated",
                index.duplicates
            );
        }
        index
    }

    /// Add a record; returns false when the key was already taken
    pub fn insert(&mut self, key: UpsertKey, record_id: impl Into<String>) -> bool {
        let record_id = record_id.into();
        self.record_ids.push(record_id.clone());
        if let Some(existing) = self.by_key.get(&key) {
            debug!("Remote record {record_id} duplicates key {key} of {existing}");
            self.duplicates += 1;
            return false;
        }
        self.by_key.insert(key, record_id);
        true
    }

    /// Remote id matching a key
    pub fn get(&self, key: &UpsertKey) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }

    /// Every remote record id, in listing order
    pub fn record_ids(&self) -> &[String] {
        &self.record_ids
    }

    /// Remote records sharing a key with an earlier one
    pub fn duplicate_count(&self) -> usize {
        self.duplicates
    }

    /// Number of remote records
    pub fn len(&self) -> usize {
        self.record_ids.len()
    }

    /// Whether there are no remote records
    pub fn is_empty(&self) -> bool {
        self.record_ids.is_empty()
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Kind of a planned operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Remove a remote record
    Delete,
    /// Create a remote record
    Insert,
    /// Overwrite fields of a remote record
    Update,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Delete => write!(f, "delete"),
            OperationKind::Insert => write!(f, "insert"),
            OperationKind::Update => write!(f, "update"),
        }
    }
}

/// One planned change to the destination
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create a record
    Insert(MappedRecord),
    /// Update a record; `record.fields` holds only the fields to overwrite
    Update {
        /// Remote record id
        remote_id: String,
        /// New values
        record: MappedRecord,
    },
    /// Delete a record
    Delete {
        /// Remote record id
        remote_id: String,
    },
}

impl Operation {
    /// Kind of this operation
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Insert(_) => OperationKind::Insert,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
        }
    }

    /// Remote id the operation targets
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Operation::Insert(_) => None,
            Operation::Update { remote_id, .. } | Operation::Delete { remote_id } => {
                Some(remote_id)
            }
        }
    }

    /// Record carried by the operation
    pub fn record(&self) -> Option<&MappedRecord> {
        match self {
            Operation::Insert(record) | Operation::Update { record, .. } => Some(record),
            Operation::Delete { .. } => None,
        }
    }

    /// Input row this operation came from
    pub fn row_number(&self) -> Option<usize> {
        self.record().map(|r| r.row_number)
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Ordered operations for one run, grouped by kind
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// Load type the plan implements
    pub load_type: LoadType,
    /// Operations; all operations of one kind are contiguous
    pub operations: Vec<Operation>,
    /// Rows that failed coercion
    pub rejected: Vec<RejectedRow>,
}

impl SyncPlan {
    /// Number of operations of a kind
    pub fn count(&self, kind: OperationKind) -> usize {
        self.operations.iter().filter(|op| op.kind() == kind).count()
    }

    /// Contiguous runs of same-kind operations, in plan order
    pub fn groups(&self) -> Vec<(OperationKind, &[Operation])> {
        let mut groups = Vec::new();
        let mut start = 0;
        while start < self.operations.len() {
            let kind = self.operations[start].kind();
            let end = self.operations[start..]
                .iter()
                .position(|op| op.kind() != kind)
                .map_or(self.operations.len(), |offset| start + offset);
            groups.push((kind, &self.operations[start..end]));
            start = end;
        }
        groups
    }

    /// Summary counts
    pub fn counts(&self) -> PlanCounts {
        PlanCounts {
            load_type: self.load_type,
            deletes: self.count(OperationKind::Delete),
            inserts: self.count(OperationKind::Insert),
            updates: self.count(OperationKind::Update),
            rejected: self.rejected.len(),
        }
    }

    /// Whether there is nothing to write
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Operation counts of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanCounts {
    /// Load type
    pub load_type: LoadType,
    /// Planned deletes
    pub deletes: usize,
    /// Planned inserts
    pub inserts: usize,
    /// Planned updates
    pub updates: usize,
    /// Rows rejected during coercion
    pub rejected: usize,
}
