//! Integration tests using mock HTTP server
//!
//! Tests the full end-to-end flow: YAML configuration → CSV rows → Airtable
//! requests → run summary, state file and job log

use airtable_sync::engine::{RunOutcome, RunPhase, SyncOrchestrator};
use airtable_sync::state::StateManager;
use airtable_sync::{AirtableClient, Configuration, CsvSourceReader, SyncSettings};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::tempdir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn settings(server: &MockServer, load_type: &str, create_table: bool) -> SyncSettings {
    let yaml = format!(
        r##"
base_id: appBase
"#api_token": pat-test
destination:
  table_name: Contacts
  load_type: {load_type}
  create_table: {create_table}
  columns:
    - {{source_name: name, destination_name: Name, dtype: singleLineText}}
    - {{source_name: email, destination_name: Email, dtype: email, upsert_key: true}}
    - {{source_name: tags, destination_name: Tags, dtype: multipleSelects}}
    - {{source_name: active, destination_name: Active, dtype: checkbox}}
    - {{source_name: joined, destination_name: Joined, dtype: date}}
advanced_options:
  requests_per_second: 100
  max_retries: 2
  multiselect_delimiter: ";"
  api_url: {uri}
"##,
        uri = server.uri()
    );
    Configuration::from_yaml(&yaml)
        .unwrap()
        .validate()
        .unwrap()
}

fn write_csv(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("contacts.csv");
    std::fs::write(
        &path,
        "email,name,tags,active,joined,ignored\n\
         ann@x.com,Ann,vip;beta,yes,2024-01-15,x\n\
         bob@x.com,Bob,,no,,y\n\
         cy@x.com,Cy,beta,1,2024-02-01T10:00:00Z,z\n",
    )
    .unwrap();
    path
}

fn read_rows(settings: &SyncSettings, csv: &Path) -> Vec<airtable_sync::SourceRow> {
    let columns: Vec<&str> = settings
        .mappings
        .iter()
        .map(|m| m.source_name.as_str())
        .collect();
    CsvSourceReader::new(csv).read(&columns).unwrap()
}

fn contacts_table(table_id: &str) -> Value {
    json!({
        "id": table_id,
        "name": "Contacts",
        "primaryFieldId": "fldE",
        "fields": [
            {"id": "fldE", "name": "Email", "type": "email"},
            {"id": "fldN", "name": "Name", "type": "singleLineText"},
            {"id": "fldT", "name": "Tags", "type": "multipleSelects",
             "options": {"choices": [{"id": "sel1", "name": "vip"}]}},
            {"id": "fldA", "name": "Active", "type": "checkbox",
             "options": {"icon": "check", "color": "greenBright"}},
            {"id": "fldJ", "name": "Joined", "type": "date",
             "options": {"dateFormat": {"name": "iso", "format": "YYYY-MM-DD"}}}
        ]
    })
}

/// Answers a record create with one id per record sent
fn echo_created(req: &Request) -> ResponseTemplate {
    let body: Value = req.body_json().unwrap_or_default();
    let count = body["records"].as_array().map_or(0, Vec::len);
    let records: Vec<Value> = (0..count)
        .map(|i| json!({"id": format!("recNew{i}"), "fields": {}}))
        .collect();
    ResponseTemplate::new(200).set_body_json(json!({ "records": records }))
}

/// Answers a delete with every id in the query
fn echo_deleted(req: &Request) -> ResponseTemplate {
    let records: Vec<Value> = req
        .url
        .query_pairs()
        .filter(|(key, _)| key == "records[]")
        .map(|(_, id)| json!({"id": id, "deleted": true}))
        .collect();
    ResponseTemplate::new(200).set_body_json(json!({ "records": records }))
}

async fn bodies(server: &MockServer, verb: &str, url_path: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == url_path)
        .map(|r| r.body_json().unwrap_or_default())
        .collect()
}

// ============================================================================
// End-to-end runs
// ============================================================================

#[tokio::test]
async fn test_incremental_run_creates_table_and_loads_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/meta/bases/appBase/tables"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tables": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v0/meta/bases/appBase/tables"))
        .respond_with(ResponseTemplate::new(200).set_body_json(contacts_table("tblNew")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v0/appBase/tblNew"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v0/appBase/tblNew"))
        .respond_with(echo_created)
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let settings = settings(&server, "Incremental Load", true);
    let rows = read_rows(&settings, &write_csv(dir.path()));
    let client = AirtableClient::from_settings(&settings).unwrap();

    let report = SyncOrchestrator::new(&client, &settings).run(&rows).await;

    let summary = &report.summary;
    assert_eq!(summary.outcome, RunOutcome::Success);
    assert_eq!(summary.phase, RunPhase::Done);
    assert_eq!((summary.total, summary.inserted, summary.failed), (3, 3, 0));
    assert!(report.schema_changes.created_table);

    // The upsert key leads the new table
    let created = bodies(&server, "POST", "/v0/meta/bases/appBase/tables").await;
    assert_eq!(created[0]["fields"][0]["name"], "Email");
    assert_eq!(created[0]["fields"][1]["name"], "Name");

    let writes = bodies(&server, "POST", "/v0/appBase/tblNew").await;
    assert_eq!(writes[0]["typecast"], true);
    assert_eq!(
        writes[0]["records"][0]["fields"],
        json!({
            "fldE": "ann@x.com",
            "fldN": "Ann",
            "fldT": ["vip", "beta"],
            "fldA": true,
            "fldJ": "2024-01-15"
        })
    );
    assert_eq!(
        writes[0]["records"][1]["fields"],
        json!({
            "fldE": "bob@x.com",
            "fldN": "Bob",
            "fldT": [],
            "fldA": false,
            "fldJ": null
        })
    );
    assert_eq!(writes[0]["records"][2]["fields"]["fldJ"], "2024-02-01");

    // State and job log
    let state_path = dir.path().join("state.json");
    let state = StateManager::new(&state_path);
    state.record_run("appBase", summary).await.unwrap();
    let reloaded = StateManager::from_file(&state_path).unwrap();
    assert_eq!(
        reloaded
            .last_run("appBase", "Contacts")
            .await
            .map(|s| s.inserted),
        Some(3)
    );

    let mut log = Vec::new();
    report.write_job_log(&mut log).unwrap();
    let log = String::from_utf8(log).unwrap();
    assert_eq!(log.lines().count(), 4);
    assert!(log.contains(",recNew2,insert,success,"));
}

#[tokio::test]
async fn test_full_load_pages_index_and_replaces_contents() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/meta/bases/appBase/tables"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "tables": [contacts_table("tblC")] })),
        )
        .mount(&server)
        .await;

    let page = |ids: std::ops::Range<usize>| -> Vec<Value> {
        ids.map(|i| json!({"id": format!("recOld{i}"), "fields": {"fldE": format!("old{i}@x.com")}}))
            .collect()
    };
    Mock::given(method("GET"))
        .and(path("/v0/appBase/tblC"))
        .and(query_param("offset", "pg2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": page(10..12) })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v0/appBase/tblC"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "records": page(0..10), "offset": "pg2" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v0/appBase/tblC"))
        .respond_with(echo_deleted)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v0/appBase/tblC"))
        .respond_with(echo_created)
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let settings = settings(&server, "Full Load", false);
    let rows = read_rows(&settings, &write_csv(dir.path()));
    let client = AirtableClient::from_settings(&settings).unwrap();

    let report = SyncOrchestrator::new(&client, &settings).run(&rows).await;

    let summary = &report.summary;
    assert_eq!(summary.outcome, RunOutcome::Success);
    assert_eq!((summary.deleted, summary.inserted), (12, 3));

    let verbs: Vec<String> = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/v0/appBase/tblC")
        .map(|r| r.method.to_string())
        .collect();
    assert_eq!(verbs, vec!["GET", "GET", "DELETE", "DELETE", "POST"]);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/meta/bases/appBase/tables"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "tables": [contacts_table("tblC")] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v0/appBase/tblC"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v0/appBase/tblC"))
        .respond_with(echo_created)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let settings = settings(&server, "Append", false);
    let rows = read_rows(&settings, &write_csv(dir.path()));
    let client = AirtableClient::from_settings(&settings).unwrap();

    let report = SyncOrchestrator::new(&client, &settings).run(&rows).await;

    assert_eq!(report.summary.outcome, RunOutcome::Success);
    assert_eq!(report.summary.inserted, 3);
    assert_eq!(bodies(&server, "POST", "/v0/appBase/tblC").await.len(), 2);
}

#[tokio::test]
async fn test_mismatched_field_type_stops_before_writing() {
    let server = MockServer::start().await;
    let mut table = contacts_table("tblC");
    table["fields"][3]["type"] = json!("singleLineText");
    Mock::given(method("GET"))
        .and(path("/v0/meta/bases/appBase/tables"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tables": [table] })))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let settings = settings(&server, "Append", false);
    let rows = read_rows(&settings, &write_csv(dir.path()));
    let client = AirtableClient::from_settings(&settings).unwrap();

    let report = SyncOrchestrator::new(&client, &settings).run(&rows).await;

    assert_eq!(report.summary.outcome, RunOutcome::Failed);
    assert_eq!(report.summary.phase, RunPhase::Failed);
    assert_eq!(report.summary.planned, None);
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.iter().all(|r| r.method.as_str() == "GET"));
}
