//! Destination schema reconciliation

use super::inference::FieldOptionsInferrer;
use super::types::{FieldBinding, SchemaChanges, TableBinding};
use crate::airtable::{AirtableApi, FieldSchema, NewTable, TableSchema};
use crate::config::{CoercionOptions, ColumnMapping};
use crate::error::{Error, Result};
use crate::source::SourceRow;
use crate::types::FieldType;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ensures the destination table and every mapped field exist
pub struct SchemaReconciler<'a> {
    api: &'a dyn AirtableApi,
    create_missing: bool,
    dry_run: bool,
    coercion: CoercionOptions,
    cancel: Option<CancellationToken>,
}

impl<'a> SchemaReconciler<'a> {
    /// Create a reconciler that creates missing tables and fields
    pub fn new(api: &'a dyn AirtableApi) -> Self {
        Self {
            api,
            create_missing: true,
            dry_run: false,
            coercion: CoercionOptions::default(),
            cancel: None,
        }
    }

    /// Whether a missing table may be created
    #[must_use]
    pub fn create_missing(mut self, enabled: bool) -> Self {
        self.create_missing = enabled;
        self
    }

    /// Report changes without making them
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Coercion options used to read select choices from the data
    #[must_use]
    pub fn coercion(mut self, options: CoercionOptions) -> Self {
        self.coercion = options;
        self
    }

    /// Abandon pending metadata requests once this token is cancelled
    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Resolve `table_ref` (name or id) and every mapping to field ids
    ///
    /// `rows` are the rows about to be written; they only feed field options
    /// and the new-choice report.
    pub async fn reconcile(
        &self,
        table_ref: &str,
        mappings: &[ColumnMapping],
        rows: &[SourceRow],
    ) -> Result<TableBinding> {
        let inferrer = FieldOptionsInferrer::from_rows(self.coercion.clone(), mappings, rows);
        let tables = self.api.list_tables(self.cancel.clone()).await?;
        debug!("Base {} has {} tables", self.api.base_id(), tables.len());

        let mut changes = SchemaChanges::default();
        let table = match tables.into_iter().find(|t| t.matches(table_ref)) {
            Some(table) => {
                info!("Found existing table '{}' ({})", table.name, table.id);
                table
            }
            None if self.create_missing => {
                changes.created_table = true;
                self.create_table(table_ref, mappings, &inferrer, &mut changes)
                    .await?
            }
            None => {
                return Err(Error::TableNotFound {
                    base: self.api.base_id().to_string(),
                    table: table_ref.to_string(),
                });
            }
        };

        let fallback = changes.primary_fallback.clone();
        let mut fields = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            let binding = match table.field(&mapping.destination_name) {
                Some(remote) => bind_existing(&table, remote, mapping, fallback.as_deref())?,
                None => {
                    self.create_field(&table, mapping, &inferrer, &mut changes)
                        .await?
                }
            };
            fields.push(binding);
        }

        for (binding, mapping) in fields.iter().zip(mappings) {
            if !binding.field_type.has_choices() {
                continue;
            }
            let known: HashSet<&str> = binding.choices.iter().map(String::as_str).collect();
            let new: Vec<String> = inferrer
                .choices(&mapping.source_name)
                .iter()
                .filter(|c| !known.contains(c.as_str()))
                .cloned()
                .collect();
            if !new.is_empty() {
                info!(
                    "Field '{}' will gain {} new select options on write: {:?}",
                    binding.name,
                    new.len(),
                    new
                );
                changes.new_choices.insert(binding.name.clone(), new);
            }
        }

        Ok(TableBinding {
            table_id: table.id,
            table_name: table.name,
            fields,
            changes,
        })
    }

    async fn create_table(
        &self,
        name: &str,
        mappings: &[ColumnMapping],
        inferrer: &FieldOptionsInferrer,
        changes: &mut SchemaChanges,
    ) -> Result<TableSchema> {
        let ordered = primary_first(mappings);
        let mut fields = Vec::with_capacity(ordered.len());
        for (idx, mapping) in ordered.iter().enumerate() {
            let mut field_type = mapping.destination_type;
            if idx == 0 && !field_type.can_be_primary() {
                warn!(
                    "Field '{}' of type '{}' cannot be the primary field; creating it as singleLineText",
                    mapping.destination_name, field_type
                );
                field_type = FieldType::SingleLineText;
                changes.primary_fallback = Some(mapping.destination_name.clone());
            }
            fields.push(inferrer.field_spec(mapping, field_type));
        }

        let request = NewTable {
            name: name.to_string(),
            fields,
        };
        if self.dry_run {
            info!("Dry run: would create table '{name}'");
            return Ok(pending_table(&request));
        }

        info!(
            "Creating table '{name}' with fields {:?}",
            request.fields.iter().map(|f| &f.name).collect::<Vec<_>>()
        );
        let created = self
            .api
            .create_table(&request, self.cancel.clone())
            .await
            .map_err(|e| schema_error(e, format!("Failed to create table '{name}'")))?;
        info!("Created table '{}' ({})", created.name, created.id);
        Ok(created)
    }

    async fn create_field(
        &self,
        table: &TableSchema,
        mapping: &ColumnMapping,
        inferrer: &FieldOptionsInferrer,
        changes: &mut SchemaChanges,
    ) -> Result<FieldBinding> {
        let spec = inferrer.field_spec(mapping, mapping.destination_type);
        changes.created_fields.push(mapping.destination_name.clone());

        if self.dry_run || table.id.is_empty() {
            info!(
                "Dry run: would create field '{}' ({})",
                spec.name, spec.field_type
            );
            return Ok(FieldBinding {
                name: mapping.destination_name.clone(),
                field_id: String::new(),
                field_type: mapping.destination_type,
                choices: Vec::new(),
            });
        }

        info!(
            "Creating field '{}' ({}) on table '{}'",
            spec.name, spec.field_type, table.name
        );
        let created = self
            .api
            .create_field(&table.id, &spec, self.cancel.clone())
            .await
            .map_err(|e| {
                schema_error(
                    e,
                    format!(
                        "Failed to create field '{}' on table '{}'",
                        spec.name, table.name
                    ),
                )
            })?;
        Ok(FieldBinding {
            name: mapping.destination_name.clone(),
            choices: created.choice_names(),
            field_id: created.id,
            field_type: mapping.destination_type,
        })
    }
}

/// Wrap an API failure as a schema error; cancellation passes through
fn schema_error(error: Error, context: String) -> Error {
    match error {
        Error::Cancelled => Error::Cancelled,
        other => Error::schema(format!("{context}: {other}")),
    }
}

/// Upsert-key columns first, the rest in mapping order
fn primary_first(mappings: &[ColumnMapping]) -> Vec<&ColumnMapping> {
    let (keys, rest): (Vec<_>, Vec<_>) = mappings.iter().partition(|m| m.is_upsert_key);
    keys.into_iter().chain(rest).collect()
}

/// Stand-in for a table that a dry run would create
fn pending_table(request: &NewTable) -> TableSchema {
    TableSchema {
        id: String::new(),
        name: request.name.clone(),
        primary_field_id: None,
        fields: request
            .fields
            .iter()
            .map(|f| FieldSchema {
                id: String::new(),
                name: f.name.clone(),
                field_type: f.field_type.clone(),
                options: f.options.clone(),
            })
            .collect(),
    }
}

fn bind_existing(
    table: &TableSchema,
    remote: &FieldSchema,
    mapping: &ColumnMapping,
    primary_fallback: Option<&str>,
) -> Result<FieldBinding> {
    let declared = mapping.destination_type;
    let remote_type: FieldType = remote.field_type.parse().map_err(|message: String| {
        if message.contains("computed") {
            Error::schema(format!(
                "Field '{}' cannot be written: {message}",
                remote.name
            ))
        } else {
            Error::FieldTypeMismatch {
                field: remote.name.clone(),
                expected: declared.to_string(),
                actual: remote.field_type.clone(),
            }
        }
    })?;

    let is_primary = table.primary_field_id.as_deref() == Some(remote.id.as_str())
        || primary_fallback == Some(remote.name.as_str());
    let field_type = if remote_type == declared {
        declared
    } else if is_primary && remote_type == FieldType::SingleLineText && !declared.can_be_primary()
    {
        warn!(
            "Primary field '{}' is singleLineText; values declared as '{}' are written as text",
            remote.name, declared
        );
        FieldType::SingleLineText
    } else {
        return Err(Error::FieldTypeMismatch {
            field: remote.name.clone(),
            expected: declared.to_string(),
            actual: remote.field_type.clone(),
        });
    };

    Ok(FieldBinding {
        name: remote.name.clone(),
        field_id: remote.id.clone(),
        field_type,
        choices: remote.choice_names(),
    })
}
