//! Batch execution
//!
//! Operations are sent kind by kind in plan order. All batches of one kind
//! finish before the next kind starts; within a kind up to `concurrency`
//! batches are in flight.

use super::types::{BatchResult, Outcome};
use crate::airtable::{AirtableApi, FieldValues, RecordUpdate};
use crate::config::MAX_RECORDS_PER_REQUEST;
use crate::error::{Error, Result};
use crate::plan::{MappedRecord, Operation, OperationKind, SyncPlan};
use crate::schema::TableBinding;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Same-kind operations sent in one request
#[derive(Debug, Clone, Copy)]
pub struct Batch<'p> {
    /// Position of the batch in the run, from 0
    pub index: usize,
    /// Kind of every operation in the batch
    pub kind: OperationKind,
    /// The operations, in plan order
    pub operations: &'p [Operation],
}

/// Split a plan into API-sized batches, preserving order
///
/// Batches never mix kinds and hold at most `size` operations.
pub fn split_batches(plan: &SyncPlan, size: usize) -> Vec<Batch<'_>> {
    let size = size.clamp(1, MAX_RECORDS_PER_REQUEST);
    let mut batches = Vec::new();
    for (kind, operations) in plan.groups() {
        for chunk in operations.chunks(size) {
            batches.push(Batch {
                index: batches.len(),
                kind,
                operations: chunk,
            });
        }
    }
    batches
}

/// Drives a plan through the API batch by batch
pub struct RecordBatcher<'a> {
    api: &'a dyn AirtableApi,
    binding: &'a TableBinding,
    records_per_request: usize,
    concurrency: usize,
    cancel: CancellationToken,
}

impl<'a> RecordBatcher<'a> {
    /// Create a batcher writing to a reconciled table
    pub fn new(api: &'a dyn AirtableApi, binding: &'a TableBinding) -> Self {
        Self {
            api,
            binding,
            records_per_request: MAX_RECORDS_PER_REQUEST,
            concurrency: 1,
            cancel: CancellationToken::new(),
        }
    }

    /// Operations per request (capped at the API limit)
    #[must_use]
    pub fn records_per_request(mut self, size: usize) -> Self {
        self.records_per_request = size.clamp(1, MAX_RECORDS_PER_REQUEST);
        self
    }

    /// Batches of one kind in flight at once
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Stop starting batches once this token is cancelled
    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Execute every operation; results are in plan order
    ///
    /// Every operation gets exactly one result.
    pub async fn execute(&self, plan: &SyncPlan) -> Vec<BatchResult> {
        let batches = split_batches(plan, self.records_per_request);
        info!(
            "Executing {} operations in {} batches",
            plan.operations.len(),
            batches.len()
        );

        let mut results = Vec::with_capacity(plan.operations.len());
        let mut start = 0;
        while start < batches.len() {
            let kind = batches[start].kind;
            let end = batches[start..]
                .iter()
                .position(|b| b.kind != kind)
                .map_or(batches.len(), |offset| start + offset);
            let group = &batches[start..end];

            let mut done: Vec<(usize, Vec<BatchResult>)> =
                stream::iter(group.iter().map(|batch| async move {
                    (batch.index, self.run_batch(batch).await)
                }))
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
            done.sort_by_key(|(index, _)| *index);
            results.extend(done.into_iter().flat_map(|(_, r)| r));

            debug!("Finished {} {kind} batches", group.len());
            start = end;
        }
        results
    }

    async fn run_batch(&self, batch: &Batch<'_>) -> Vec<BatchResult> {
        if self.cancel.is_cancelled() {
            return not_attempted(batch);
        }

        let results = match batch.kind {
            OperationKind::Insert => self.run_inserts(batch).await,
            OperationKind::Update => self.run_updates(batch).await,
            OperationKind::Delete => self.run_deletes(batch).await,
        };
        let results = match results {
            Ok(results) => results,
            // Cancelled while waiting for the rate limiter; nothing was sent
            Err(Error::Cancelled) => return not_attempted(batch),
            Err(error) => {
                warn!(
                    batch = batch.index,
                    kind = %batch.kind,
                    "Batch of {} failed: {error}",
                    batch.operations.len()
                );
                fail_all(batch, &error)
            }
        };

        let failed = results.iter().filter(|r| !r.is_success()).count();
        debug!(
            batch = batch.index,
            kind = %batch.kind,
            size = batch.operations.len(),
            failed,
            "Batch completed"
        );
        results
    }

    async fn run_inserts(&self, batch: &Batch<'_>) -> Result<Vec<BatchResult>> {
        let records = batch
            .operations
            .iter()
            .map(|op| self.field_values(op))
            .collect::<Result<Vec<_>>>()?;
        let created = self
            .api
            .create_records(&self.binding.table_id, records, Some(self.cancel.clone()))
            .await?;

        // Created records come back in request order
        Ok(batch
            .operations
            .iter()
            .enumerate()
            .map(|(i, op)| match created.get(i) {
                Some(record) => BatchResult::new(op, batch.index, Outcome::Succeeded)
                    .with_remote_id(&record.id),
                None => missing_from_response(op, batch.index),
            })
            .collect())
    }

    async fn run_updates(&self, batch: &Batch<'_>) -> Result<Vec<BatchResult>> {
        let updates = batch
            .operations
            .iter()
            .map(|op| {
                Ok(RecordUpdate {
                    id: op.remote_id().unwrap_or_default().to_string(),
                    fields: self.field_values(op)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let updated = self
            .api
            .update_records(&self.binding.table_id, updates, Some(self.cancel.clone()))
            .await?;

        let returned: HashSet<&str> = updated.iter().map(|r| r.id.as_str()).collect();
        Ok(confirm_by_id(batch, &returned))
    }

    async fn run_deletes(&self, batch: &Batch<'_>) -> Result<Vec<BatchResult>> {
        let ids = batch
            .operations
            .iter()
            .filter_map(|op| op.remote_id().map(str::to_string))
            .collect();
        let deleted = self
            .api
            .delete_records(&self.binding.table_id, ids, Some(self.cancel.clone()))
            .await?;

        let returned: HashSet<&str> = deleted
            .iter()
            .filter(|r| r.deleted)
            .map(|r| r.id.as_str())
            .collect();
        Ok(confirm_by_id(batch, &returned))
    }

    /// Record fields keyed by field id
    fn field_values(&self, operation: &Operation) -> Result<FieldValues> {
        let Some(record) = operation.record() else {
            return Ok(FieldValues::new());
        };
        translate(record, self.binding)
    }
}

fn translate(record: &MappedRecord, binding: &TableBinding) -> Result<FieldValues> {
    let mut values = FieldValues::new();
    for (name, value) in &record.fields {
        let field_id = binding.field_id(name).ok_or_else(|| {
            Error::schema(format!(
                "Field '{name}' has no id in table '{}'",
                binding.table_name
            ))
        })?;
        values.insert(field_id.to_string(), value.clone());
    }
    Ok(values)
}

fn confirm_by_id(batch: &Batch<'_>, returned: &HashSet<&str>) -> Vec<BatchResult> {
    batch
        .operations
        .iter()
        .map(|op| match op.remote_id() {
            Some(id) if returned.contains(id) => {
                BatchResult::new(op, batch.index, Outcome::Succeeded)
            }
            _ => missing_from_response(op, batch.index),
        })
        .collect()
}

fn missing_from_response(operation: &Operation, batch: usize) -> BatchResult {
    let error = Error::unexpected(format!(
        "{} not confirmed in the API response",
        operation.kind()
    ));
    BatchResult::new(operation, batch, Outcome::failed(&error))
}

fn not_attempted(batch: &Batch<'_>) -> Vec<BatchResult> {
    batch
        .operations
        .iter()
        .map(|op| BatchResult::new(op, batch.index, Outcome::NotAttempted))
        .collect()
}

fn fail_all(batch: &Batch<'_>, error: &Error) -> Vec<BatchResult> {
    batch
        .operations
        .iter()
        .map(|op| BatchResult::new(op, batch.index, Outcome::failed(error)))
        .collect()
}
