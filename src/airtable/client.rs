//! Airtable REST client
//!
//! A thin wrapper over [`HttpClient`]: it knows Airtable's paths and bodies,
//! and nothing about load semantics. Retries and pacing happen in the
//! transport.

use super::types::{
    DeletedList, DeletedRecord, FieldSchema, FieldValues, NewField, NewTable, RecordList,
    RecordPage, RecordUpdate, RemoteRecord, TableList, TableSchema,
};
use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::http::{HttpClient, RequestConfig};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Records per page when listing
pub const LIST_PAGE_SIZE: usize = 100;

/// Schema and record operations of the destination API
#[async_trait]
pub trait AirtableApi: Send + Sync {
    /// Base the client is bound to
    fn base_id(&self) -> &str;

    /// List the tables of the base, with their fields
    async fn list_tables(&self, cancel: Option<CancellationToken>) -> Result<Vec<TableSchema>>;

    /// Create a table
    async fn create_table(
        &self,
        table: &NewTable,
        cancel: Option<CancellationToken>,
    ) -> Result<TableSchema>;

    /// Create a field on a table
    async fn create_field(
        &self,
        table_id: &str,
        field: &NewField,
        cancel: Option<CancellationToken>,
    ) -> Result<FieldSchema>;

    /// Fetch one page of records, fields keyed by field id
    async fn list_records_page(
        &self,
        table_id: &str,
        field_ids: &[String],
        offset: Option<&str>,
        cancel: Option<CancellationToken>,
    ) -> Result<RecordPage>;

    /// Create records (at most the per-request limit)
    async fn create_records(
        &self,
        table_id: &str,
        records: Vec<FieldValues>,
        cancel: Option<CancellationToken>,
    ) -> Result<Vec<RemoteRecord>>;

    /// Update records by id (at most the per-request limit)
    async fn update_records(
        &self,
        table_id: &str,
        records: Vec<RecordUpdate>,
        cancel: Option<CancellationToken>,
    ) -> Result<Vec<RemoteRecord>>;

    /// Delete records by id (at most the per-request limit)
    async fn delete_records(
        &self,
        table_id: &str,
        record_ids: Vec<String>,
        cancel: Option<CancellationToken>,
    ) -> Result<Vec<DeletedRecord>>;

    /// Fetch every record of a table, following page tokens
    ///
    /// Stops with [`Error::Cancelled`] before the next page once `cancel`
    /// fires.
    async fn list_all_records(
        &self,
        table_id: &str,
        field_ids: &[String],
        cancel: Option<CancellationToken>,
    ) -> Result<Vec<RemoteRecord>> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        let mut pages = 0usize;
        loop {
            if pages > 0 && cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                debug!("Listing of {table_id} cancelled after {pages} pages");
                return Err(Error::Cancelled);
            }
            let page = self
                .list_records_page(table_id, field_ids, offset.as_deref(), cancel.clone())
                .await?;
            pages += 1;
            records.extend(page.records);
            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }
        debug!(
            "Listed {} records from {table_id} in {pages} pages",
            records.len()
        );
        Ok(records)
    }
}

/// [`AirtableApi`] over HTTP
#[derive(Debug)]
pub struct AirtableClient {
    http: HttpClient,
    base_id: String,
}

impl AirtableClient {
    /// Create a client for one base
    pub fn new(http: HttpClient, base_id: impl Into<String>) -> Self {
        Self {
            http,
            base_id: base_id.into(),
        }
    }

    /// Create a client from validated settings
    pub fn from_settings(settings: &SyncSettings) -> Result<Self> {
        let http = HttpClient::with_config(settings.http_config())?;
        Ok(Self::new(http, settings.base_id.clone()))
    }

    fn meta_tables_path(&self) -> String {
        format!("/v0/meta/bases/{}/tables", self.base_id)
    }

    fn records_path(&self, table_id: &str) -> String {
        format!("/v0/{}/{}", self.base_id, encode_segment(table_id))
    }
}

#[async_trait]
impl AirtableApi for AirtableClient {
    fn base_id(&self) -> &str {
        &self.base_id
    }

    async fn list_tables(&self, cancel: Option<CancellationToken>) -> Result<Vec<TableSchema>> {
        let list: TableList = self
            .http
            .request_json(
                Method::GET,
                &self.meta_tables_path(),
                with_cancel(RequestConfig::new(), cancel),
            )
            .await?;
        Ok(list.tables)
    }

    async fn create_table(
        &self,
        table: &NewTable,
        cancel: Option<CancellationToken>,
    ) -> Result<TableSchema> {
        let body = serde_json::to_value(table)?;
        self.http
            .request_json(
                Method::POST,
                &self.meta_tables_path(),
                with_cancel(RequestConfig::new().json(body), cancel),
            )
            .await
    }

    async fn create_field(
        &self,
        table_id: &str,
        field: &NewField,
        cancel: Option<CancellationToken>,
    ) -> Result<FieldSchema> {
        let path = format!("{}/{}/fields", self.meta_tables_path(), table_id);
        let body = serde_json::to_value(field)?;
        self.http
            .request_json(
                Method::POST,
                &path,
                with_cancel(RequestConfig::new().json(body), cancel),
            )
            .await
    }

    async fn list_records_page(
        &self,
        table_id: &str,
        field_ids: &[String],
        offset: Option<&str>,
        cancel: Option<CancellationToken>,
    ) -> Result<RecordPage> {
        let mut config = RequestConfig::new()
            .query("pageSize", LIST_PAGE_SIZE.to_string())
            .query("returnFieldsByFieldId", "true");
        for field_id in field_ids {
            config = config.query("fields[]", field_id.as_str());
        }
        if let Some(offset) = offset {
            config = config.query("offset", offset);
        }
        self.http
            .request_json(
                Method::GET,
                &self.records_path(table_id),
                with_cancel(config, cancel),
            )
            .await
    }

    async fn create_records(
        &self,
        table_id: &str,
        records: Vec<FieldValues>,
        cancel: Option<CancellationToken>,
    ) -> Result<Vec<RemoteRecord>> {
        let records: Vec<_> = records
            .into_iter()
            .map(|fields| json!({ "fields": fields }))
            .collect();
        let body = json!({
            "records": records,
            "typecast": true,
            "returnFieldsByFieldId": true,
        });
        let list: RecordList = self
            .http
            .request_json(
                Method::POST,
                &self.records_path(table_id),
                with_cancel(RequestConfig::new().json(body), cancel),
            )
            .await?;
        Ok(list.records)
    }

    async fn update_records(
        &self,
        table_id: &str,
        records: Vec<RecordUpdate>,
        cancel: Option<CancellationToken>,
    ) -> Result<Vec<RemoteRecord>> {
        let body = json!({
            "records": records,
            "typecast": true,
            "returnFieldsByFieldId": true,
        });
        let list: RecordList = self
            .http
            .request_json(
                Method::PATCH,
                &self.records_path(table_id),
                with_cancel(RequestConfig::new().json(body), cancel),
            )
            .await?;
        Ok(list.records)
    }

    async fn delete_records(
        &self,
        table_id: &str,
        record_ids: Vec<String>,
        cancel: Option<CancellationToken>,
    ) -> Result<Vec<DeletedRecord>> {
        let mut config = RequestConfig::new();
        for id in record_ids {
            config = config.query("records[]", id);
        }
        let list: DeletedList = self
            .http
            .request_json(
                Method::DELETE,
                &self.records_path(table_id),
                with_cancel(config, cancel),
            )
            .await?;
        Ok(list.records)
    }
}

fn with_cancel(config: RequestConfig, cancel: Option<CancellationToken>) -> RequestConfig {
    match cancel {
        Some(token) => config.cancel_on(token),
        None => config,
    }
}

/// Percent-encode a table name for use as a path segment
fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
