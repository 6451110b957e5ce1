//! Source row to destination record mapping

use super::types::{key_text, MappedRecord, RejectedRow, UpsertKey};
use crate::coerce::FieldCoercer;
use crate::config::{CoercionOptions, ColumnMapping};
use crate::error::{Error, Result};
use crate::schema::TableBinding;
use crate::source::SourceRow;
use crate::types::{FieldType, JsonObject};
use tracing::debug;

/// Rows mapped for planning
#[derive(Debug, Default)]
pub struct MappedRows {
    /// Rows that coerced cleanly, in input order
    pub records: Vec<MappedRecord>,
    /// Rows with at least one invalid value
    pub rejected: Vec<RejectedRow>,
}

#[derive(Debug, Clone)]
struct Column {
    mapping: ColumnMapping,
    field_type: FieldType,
}

/// Coerces source rows through the column mapping
#[derive(Debug, Clone)]
pub struct RecordMapper {
    coercer: FieldCoercer,
    columns: Vec<Column>,
    chunk_size: usize,
}

impl RecordMapper {
    /// Create a mapper using the declared destination types
    pub fn new(mappings: &[ColumnMapping], options: CoercionOptions) -> Self {
        Self {
            coercer: FieldCoercer::new(options),
            columns: mappings
                .iter()
                .map(|m| Column {
                    mapping: m.clone(),
                    field_type: m.destination_type,
                })
                .collect(),
            chunk_size: usize::MAX,
        }
    }

    /// Coerce to the types the table actually has
    #[must_use]
    pub fn with_binding(mut self, binding: &TableBinding) -> Self {
        for column in &mut self.columns {
            if let Some(field_type) = binding.field_type(&column.mapping.destination_name) {
                column.field_type = field_type;
            }
        }
        self
    }

    /// Log progress every `size` rows
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Map one row
    ///
    /// A mapped column missing from the row is a configuration error; an
    /// uninterpretable value is a validation error.
    pub fn map(&self, row_number: usize, row: &SourceRow) -> Result<MappedRecord> {
        let delimiter = self.coercer.options().multiselect_delimiter.as_str();
        let mut fields = JsonObject::new();
        let mut key_parts = Vec::new();

        for column in &self.columns {
            let mapping = &column.mapping;
            let raw = row.get(&mapping.source_name).ok_or_else(|| {
                Error::config(format!(
                    "Column '{}' is mapped but missing from the input table",
                    mapping.source_name
                ))
            })?;
            let wire = self
                .coercer
                .coerce(raw, column.field_type, &mapping.source_name)?;
            if mapping.is_upsert_key {
                key_parts.push(key_text(&wire, column.field_type, delimiter));
            }
            fields.insert(mapping.destination_name.clone(), wire);
        }

        let record = MappedRecord::new(row_number, fields);
        Ok(if key_parts.is_empty() {
            record
        } else {
            record.with_key(UpsertKey(key_parts))
        })
    }

    /// Map every row, collecting invalid rows instead of failing
    pub fn map_all(&self, rows: &[SourceRow]) -> Result<MappedRows> {
        let mut mapped = MappedRows::default();
        for (chunk_index, chunk) in rows.chunks(self.chunk_size).enumerate() {
            let offset = chunk_index.saturating_mul(self.chunk_size);
            for (i, row) in chunk.iter().enumerate() {
                let row_number = offset + i + 1;
                match self.map(row_number, row) {
                    Ok(record) => mapped.records.push(record),
                    Err(error @ Error::Validation { .. }) => {
                        debug!("Row {row_number} rejected: {error}");
                        mapped.rejected.push(RejectedRow { row_number, error });
                    }
                    Err(error) => return Err(error),
                }
            }
            debug!(
                "Mapped rows {}..{} ({} rejected so far)",
                offset + 1,
                offset + chunk.len(),
                mapped.rejected.len()
            );
        }
        Ok(mapped)
    }
}
