//! Airtable API module
//!
//! The remote collaborator of the sync engine: schema metadata, paginated
//! record listing and batch writes. Business rules live elsewhere.

mod client;
mod types;

pub use client::{AirtableApi, AirtableClient, LIST_PAGE_SIZE};
pub use types::{
    DeletedList, DeletedRecord, FieldSchema, FieldValues, NewField, NewTable, RecordList,
    RecordPage, RecordUpdate, RemoteRecord, TableList, TableSchema,
};
