//! Batch execution tests

use super::*;
use crate::airtable::{
    AirtableApi, DeletedRecord, FieldSchema, FieldValues, NewField, NewTable, RecordPage,
    RecordUpdate, RemoteRecord, TableSchema,
};
use crate::error::{Error, ErrorCategory, Result};
use crate::plan::{MappedRecord, Operation, OperationKind, SyncPlan};
use crate::schema::{FieldBinding, SchemaChanges, TableBinding};
use crate::types::{FieldType, LoadType};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// In-memory API
// ============================================================================

#[derive(Default)]
struct FakeApi {
    calls: Mutex<Vec<(OperationKind, usize)>>,
    sent: Mutex<Vec<serde_json::Value>>,
    fail_calls: HashSet<usize>,
    drop_last_insert: bool,
    delay: Option<Duration>,
    cancel_after: Option<(usize, CancellationToken)>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeApi {
    async fn call(&self, kind: OperationKind, size: usize) -> Result<()> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((kind, size));
            calls.len() - 1
        };
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some((after, token)) = &self.cancel_after {
            if index + 1 >= *after {
                token.cancel();
            }
        }
        if self.fail_calls.contains(&index) {
            return Err(Error::http_status(422, "INVALID_VALUE_FOR_COLUMN"));
        }
        Ok(())
    }

    fn kinds(&self) -> Vec<(OperationKind, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AirtableApi for FakeApi {
    fn base_id(&self) -> &str {
        "appFake"
    }

    async fn list_tables(&self, _cancel: Option<CancellationToken>) -> Result<Vec<TableSchema>> {
        Err(Error::Other("unsupported".into()))
    }

    async fn create_table(
        &self,
        _table: &NewTable,
        _cancel: Option<CancellationToken>,
    ) -> Result<TableSchema> {
        Err(Error::Other("unsupported".into()))
    }

    async fn create_field(
        &self,
        _table_id: &str,
        _field: &NewField,
        _cancel: Option<CancellationToken>,
    ) -> Result<FieldSchema> {
        Err(Error::Other("unsupported".into()))
    }

    async fn list_records_page(
        &self,
        _table_id: &str,
        _field_ids: &[String],
        _offset: Option<&str>,
        _cancel: Option<CancellationToken>,
    ) -> Result<RecordPage> {
        Err(Error::Other("unsupported".into()))
    }

    async fn create_records(
        &self,
        _table_id: &str,
        records: Vec<FieldValues>,
        _cancel: Option<CancellationToken>,
    ) -> Result<Vec<RemoteRecord>> {
        self.call(OperationKind::Insert, records.len()).await?;
        let mut created: Vec<RemoteRecord> = records
            .into_iter()
            .map(|fields| {
                self.sent.lock().unwrap().push(json!(fields));
                RemoteRecord {
                    id: format!("recNew{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
                    created_time: None,
                    fields,
                }
            })
            .collect();
        if self.drop_last_insert {
            created.pop();
        }
        Ok(created)
    }

    async fn update_records(
        &self,
        _table_id: &str,
        records: Vec<RecordUpdate>,
        _cancel: Option<CancellationToken>,
    ) -> Result<Vec<RemoteRecord>> {
        self.call(OperationKind::Update, records.len()).await?;
        Ok(records
            .into_iter()
            .map(|update| {
                self.sent.lock().unwrap().push(json!(update.fields));
                RemoteRecord {
                    id: update.id,
                    created_time: None,
                    fields: update.fields,
                }
            })
            .collect())
    }

    async fn delete_records(
        &self,
        _table_id: &str,
        record_ids: Vec<String>,
        _cancel: Option<CancellationToken>,
    ) -> Result<Vec<DeletedRecord>> {
        self.call(OperationKind::Delete, record_ids.len()).await?;
        Ok(record_ids
            .into_iter()
            .map(|id| DeletedRecord { id, deleted: true })
            .collect())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn binding() -> TableBinding {
    TableBinding {
        table_id: "tbl1".to_string(),
        table_name: "Contacts".to_string(),
        fields: vec![
            FieldBinding {
                name: "email".to_string(),
                field_id: "fldE".to_string(),
                field_type: FieldType::Email,
                choices: Vec::new(),
            },
            FieldBinding {
                name: "name".to_string(),
                field_id: "fldN".to_string(),
                field_type: FieldType::SingleLineText,
                choices: Vec::new(),
            },
        ],
        changes: SchemaChanges::default(),
    }
}

fn insert(row: usize) -> Operation {
    let fields = json!({"email": format!("u{row}@x.com"), "name": "x"});
    Operation::Insert(MappedRecord::new(row, fields.as_object().cloned().unwrap()))
}

fn delete(i: usize) -> Operation {
    Operation::Delete {
        remote_id: format!("recOld{i}"),
    }
}

fn plan(operations: Vec<Operation>) -> SyncPlan {
    SyncPlan {
        load_type: LoadType::FullLoad,
        operations,
        rejected: Vec::new(),
    }
}

fn full_load_plan(deletes: usize, inserts: usize) -> SyncPlan {
    plan((0..deletes)
        .map(delete)
        .chain((1..=inserts).map(insert))
        .collect())
}

// ============================================================================
// Splitting
// ============================================================================

#[test]
fn test_split_47_inserts_into_5_batches() {
    let plan = plan((1..=47).map(insert).collect());
    let sizes: Vec<_> = split_batches(&plan, 10)
        .iter()
        .map(|b| b.operations.len())
        .collect();
    assert_eq!(sizes, vec![10, 10, 10, 10, 7]);
}

#[test]
fn test_split_full_load_keeps_kinds_apart() {
    let plan = full_load_plan(12, 25);
    let batches: Vec<_> = split_batches(&plan, 10)
        .iter()
        .map(|b| (b.index, b.kind, b.operations.len()))
        .collect();
    assert_eq!(
        batches,
        vec![
            (0, OperationKind::Delete, 10),
            (1, OperationKind::Delete, 2),
            (2, OperationKind::Insert, 10),
            (3, OperationKind::Insert, 10),
            (4, OperationKind::Insert, 5),
        ]
    );
}

#[test]
fn test_split_never_exceeds_api_limit() {
    let plan = plan((1..=30).map(insert).collect());
    assert!(split_batches(&plan, 500)
        .iter()
        .all(|b| b.operations.len() <= 10));
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_execute_full_load_in_order() {
    let api = FakeApi::default();
    let binding = binding();
    let plan = full_load_plan(12, 25);

    let results = RecordBatcher::new(&api, &binding).execute(&plan).await;

    assert_eq!(
        api.kinds(),
        vec![
            (OperationKind::Delete, 10),
            (OperationKind::Delete, 2),
            (OperationKind::Insert, 10),
            (OperationKind::Insert, 10),
            (OperationKind::Insert, 5),
        ]
    );
    assert_eq!(results.len(), 37);
    assert!(results.iter().all(BatchResult::is_success));
    assert_eq!(results[0].remote_id.as_deref(), Some("recOld0"));
    assert_eq!(results[12].row_number, Some(1));
    assert!(results[12]
        .remote_id
        .as_deref()
        .is_some_and(|id| id.starts_with("recNew")));
}

#[tokio::test]
async fn test_execute_translates_names_to_field_ids() {
    let api = FakeApi::default();
    let binding = binding();
    let mut fields = serde_json::Map::new();
    fields.insert("name".to_string(), json!("Ann"));
    let plan = plan(vec![Operation::Update {
        remote_id: "rec1".to_string(),
        record: MappedRecord::new(1, fields),
    }]);

    let results = RecordBatcher::new(&api, &binding).execute(&plan).await;

    assert!(results[0].is_success());
    assert_eq!(results[0].remote_id.as_deref(), Some("rec1"));
    assert_eq!(api.sent.lock().unwrap().clone(), vec![json!({"fldN": "Ann"})]);
}

#[tokio::test]
async fn test_failed_batch_only_fails_its_operations() {
    let api = FakeApi {
        fail_calls: [1].into_iter().collect(),
        ..FakeApi::default()
    };
    let binding = binding();
    let plan = plan((1..=25).map(insert).collect());

    let results = RecordBatcher::new(&api, &binding).execute(&plan).await;

    assert_eq!(results.len(), 25);
    let failed: Vec<_> = results
        .iter()
        .filter(|r| !r.is_success())
        .filter_map(|r| r.row_number)
        .collect();
    assert_eq!(failed, (11..=20).collect::<Vec<_>>());
    match &results[10].outcome {
        Outcome::Failed { category, message } => {
            assert_eq!(*category, ErrorCategory::Api);
            assert!(message.contains("422"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unconfirmed_record_fails() {
    let api = FakeApi {
        drop_last_insert: true,
        ..FakeApi::default()
    };
    let binding = binding();
    let plan = plan((1..=3).map(insert).collect());

    let results = RecordBatcher::new(&api, &binding).execute(&plan).await;
    assert!(results[0].is_success());
    assert!(results[1].is_success());
    assert!(results[2].error().unwrap().contains("not confirmed"));
}

#[tokio::test]
async fn test_unknown_field_fails_batch_with_schema_error() {
    let api = FakeApi::default();
    let binding = binding();
    let mut fields = serde_json::Map::new();
    fields.insert("phone".to_string(), json!("555"));
    let plan = plan(vec![Operation::Insert(MappedRecord::new(1, fields))]);

    let results = RecordBatcher::new(&api, &binding).execute(&plan).await;

    assert!(api.kinds().is_empty());
    assert!(matches!(
        results[0].outcome,
        Outcome::Failed {
            category: ErrorCategory::Schema,
            ..
        }
    ));
}

#[tokio::test]
async fn test_cancellation_leaves_remaining_batches_not_attempted() {
    let token = CancellationToken::new();
    let api = FakeApi {
        cancel_after: Some((1, token.clone())),
        ..FakeApi::default()
    };
    let binding = binding();
    let plan = full_load_plan(12, 5);

    let results = RecordBatcher::new(&api, &binding)
        .cancel_on(token)
        .execute(&plan)
        .await;

    assert_eq!(api.kinds(), vec![(OperationKind::Delete, 10)]);
    assert_eq!(results.len(), 17);
    assert!(results[..10].iter().all(BatchResult::is_success));
    assert!(results[10..]
        .iter()
        .all(|r| r.outcome == Outcome::NotAttempted));
}

#[tokio::test]
async fn test_concurrency_budget_and_kind_barrier() {
    let api = FakeApi {
        delay: Some(Duration::from_millis(20)),
        ..FakeApi::default()
    };
    let binding = binding();
    let plan = full_load_plan(40, 40);

    let results = RecordBatcher::new(&api, &binding)
        .concurrency(3)
        .execute(&plan)
        .await;

    assert_eq!(results.len(), 80);
    let max = api.max_in_flight.load(Ordering::SeqCst);
    assert!(max > 1 && max <= 3, "max in flight was {max}");

    let kinds: Vec<_> = api.kinds().into_iter().map(|(k, _)| k).collect();
    let first_insert = kinds
        .iter()
        .position(|k| *k == OperationKind::Insert)
        .unwrap();
    assert!(kinds[..first_insert]
        .iter()
        .all(|k| *k == OperationKind::Delete));
    assert_eq!(first_insert, 4);
    assert_eq!(
        results
            .iter()
            .map(|r| r.kind)
            .position(|k| k == OperationKind::Insert),
        Some(40)
    );
}
