//! Collaborator contracts for object storage and the structured data store
//!
//! The admin flow only ever talks to these two traits, so any hosted
//! backend (or an in-memory fake) can sit behind it.

use crate::error::BackendResult;
use async_trait::async_trait;
use placedir_core::{Attachment, NewRecord, OrderBy, Record, RecordId, ToggleField};
use serde_json::{Map, Value};

/// Partial column update sent to [`DataStore::update`]
pub type FieldUpdate = Map<String, Value>;

/// Build an update that sets a single boolean column
#[must_use]
pub fn flag_update(field: ToggleField, value: bool) -> FieldUpdate {
    let mut fields = FieldUpdate::new();
    fields.insert(field.column().to_string(), Value::Bool(value));
    fields
}

/// Binary object storage with public URLs
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store an attachment under `key` in `bucket`
    async fn upload(&self, bucket: &str, key: &str, attachment: &Attachment) -> BackendResult<()>;

    /// Public URL for a stored object, `None` when the service cannot give one
    async fn public_url(&self, bucket: &str, key: &str) -> BackendResult<Option<String>>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Table-oriented record store
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Insert one record; the store assigns `id` and `created_at`
    async fn insert(&self, table: &str, record: &NewRecord) -> BackendResult<()>;

    /// Apply `fields` to the row with `id`
    async fn update(&self, table: &str, id: &RecordId, fields: &FieldUpdate) -> BackendResult<()>;

    /// Every row of `table` in the requested order
    async fn select(&self, table: &str, order: &OrderBy) -> BackendResult<Vec<Record>>;

    /// Backend name for logs
    fn name(&self) -> &str;
}
