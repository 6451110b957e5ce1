//! Load planning
//!
//! Turns mapped rows into an ordered list of operations for one load type.
//! Planning never talks to the API; the remote index is built beforehand.

use super::mapper::MappedRows;
use super::types::{MappedRecord, Operation, RemoteIndex, SyncPlan, UpsertKey};
use crate::error::{Error, Result};
use crate::types::LoadType;
use std::collections::HashMap;
use tracing::{debug, info};

/// Builds a [`SyncPlan`] for a load type
#[derive(Debug, Clone)]
pub struct LoadPlanner {
    load_type: LoadType,
    key_fields: Vec<String>,
}

impl LoadPlanner {
    /// Create a planner; `key_fields` are the upsert-key destination names
    pub fn new<S: Into<String>>(
        load_type: LoadType,
        key_fields: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            load_type,
            key_fields: key_fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Load type being planned
    pub fn load_type(&self) -> LoadType {
        self.load_type
    }

    /// Plan the operations
    ///
    /// `index` is required for full and incremental loads and ignored for
    /// appends.
    pub fn plan(&self, rows: MappedRows, index: Option<&RemoteIndex>) -> Result<SyncPlan> {
        let MappedRows { records, rejected } = rows;
        let operations = match self.load_type {
            LoadType::Append => records.into_iter().map(Operation::Insert).collect(),
            LoadType::FullLoad => plan_full_load(records, self.require(index)?),
            LoadType::Incremental => self.plan_incremental(records, self.require(index)?)?,
        };

        let plan = SyncPlan {
            load_type: self.load_type,
            operations,
            rejected,
        };
        let counts = plan.counts();
        info!(
            "Planned {}: {} deletes, {} inserts, {} updates, {} rejected rows",
            self.load_type, counts.deletes, counts.inserts, counts.updates, counts.rejected
        );
        Ok(plan)
    }

    fn require<'a>(&self, index: Option<&'a RemoteIndex>) -> Result<&'a RemoteIndex> {
        index.ok_or_else(|| {
            Error::Other(format!(
                "{} planning needs the existing remote records",
                self.load_type
            ))
        })
    }

    fn plan_incremental(
        &self,
        records: Vec<MappedRecord>,
        index: &RemoteIndex,
    ) -> Result<Vec<Operation>> {
        if self.key_fields.is_empty() {
            return Err(Error::config(
                "Incremental Load requires at least one column marked as upsert key",
            ));
        }

        let unique = collapse_duplicates(records)?;
        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        for mut record in unique {
            let matched = record
                .key
                .as_ref()
                .and_then(|key| index.get(key))
                .map(str::to_string);
            match matched {
                Some(remote_id) => {
                    for field in &self.key_fields {
                        record.fields.remove(field);
                    }
                    record.remote_id = Some(remote_id.clone());
                    updates.push(Operation::Update { remote_id, record });
                }
                None => inserts.push(Operation::Insert(record)),
            }
        }

        inserts.extend(updates);
        Ok(inserts)
    }
}

fn plan_full_load(records: Vec<MappedRecord>, index: &RemoteIndex) -> Vec<Operation> {
    let mut operations: Vec<Operation> = index
        .record_ids()
        .iter()
        .map(|id| Operation::Delete {
            remote_id: id.clone(),
        })
        .collect();
    operations.extend(records.into_iter().map(Operation::Insert));
    operations
}

/// Keep one record per key: the last row's values at the first row's position
fn collapse_duplicates(records: Vec<MappedRecord>) -> Result<Vec<MappedRecord>> {
    let mut positions: HashMap<UpsertKey, usize> = HashMap::new();
    let mut unique: Vec<MappedRecord> = Vec::with_capacity(records.len());

    for record in records {
        let key = record.key.clone().ok_or_else(|| {
            Error::Other(format!("row {} has no upsert key", record.row_number))
        })?;
        match positions.get(&key) {
            Some(&pos) => {
                debug!(
                    "Row {} repeats key {key} of row {}; later values win",
                    record.row_number, unique[pos].row_number
                );
                unique[pos] = record;
            }
            None => {
                positions.insert(key, unique.len());
                unique.push(record);
            }
        }
    }
    Ok(unique)
}
