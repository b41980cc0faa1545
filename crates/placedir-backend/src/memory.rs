//! In-memory backend for tests and dry runs
//!
//! Keeps tables and objects in process, journals every call in order and
//! can be told to fail a given operation with a given message.

use crate::error::{BackendError, BackendResult};
use crate::service::{DataStore, FieldUpdate, ObjectStorage};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use placedir_core::{
    Attachment, NewRecord, OrderBy, Record, RecordId, SortDirection, ToggleField,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{Duration, sleep};

/// Backend operations that can be counted or made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`ObjectStorage::upload`]
    Upload,
    /// [`ObjectStorage::public_url`]
    PublicUrl,
    /// [`DataStore::insert`]
    Insert,
    /// [`DataStore::update`]
    Update,
    /// [`DataStore::select`]
    Select,
}

/// One journaled backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    /// Object upload
    Upload {
        /// Target bucket
        bucket: String,
        /// Object key
        key: String,
        /// Payload size
        len: usize,
    },
    /// Public URL lookup
    PublicUrl {
        /// Bucket
        bucket: String,
        /// Object key
        key: String,
    },
    /// Record insert
    Insert {
        /// Target table
        table: String,
        /// Payload as sent
        record: NewRecord,
    },
    /// Partial update
    Update {
        /// Target table
        table: String,
        /// Row identifier
        id: RecordId,
        /// Columns as sent
        fields: FieldUpdate,
    },
    /// Listing
    Select {
        /// Target table
        table: String,
        /// Requested order
        order: OrderBy,
    },
}

impl BackendCall {
    /// Operation this call belongs to
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Upload { .. } => Operation::Upload,
            Self::PublicUrl { .. } => Operation::PublicUrl,
            Self::Insert { .. } => Operation::Insert,
            Self::Update { .. } => Operation::Update,
            Self::Select { .. } => Operation::Select,
        }
    }
}

#[derive(Debug)]
struct Failure {
    message: String,
    remaining: Option<u32>,
}

#[derive(Debug)]
struct State {
    tables: HashMap<String, Vec<Record>>,
    objects: HashMap<(String, String), Attachment>,
    calls: Vec<BackendCall>,
    failures: HashMap<Operation, Failure>,
    next_id: i64,
    clock: DateTime<Utc>,
}

impl State {
    /// Record the call, then fail it if a failure is armed for its operation
    fn enter(&mut self, call: BackendCall) -> BackendResult<()> {
        let operation = call.operation();
        self.calls.push(call);

        let Some(failure) = self.failures.get_mut(&operation) else {
            return Ok(());
        };
        let message = failure.message.clone();
        let exhausted = match &mut failure.remaining {
            Some(remaining) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            None => false,
        };
        if exhausted {
            self.failures.remove(&operation);
        }
        Err(BackendError::service(message))
    }

    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += TimeDelta::seconds(1);
        self.clock
    }
}

/// In-process implementation of both collaborator contracts
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    state: Arc<Mutex<State>>,
    public_base: Option<String>,
    latency: Option<Duration>,
}

impl InMemoryBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        let clock = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .map_or_else(|_| Utc::now(), |start| start.with_timezone(&Utc));

        Self {
            state: Arc::new(Mutex::new(State {
                tables: HashMap::new(),
                objects: HashMap::new(),
                calls: Vec::new(),
                failures: HashMap::new(),
                next_id: 1,
                clock,
            })),
            public_base: Some("memory://public".to_string()),
            latency: None,
        }
    }

    /// Answer public URL lookups with nothing
    #[must_use]
    pub fn without_public_urls(mut self) -> Self {
        self.public_base = None;
        self
    }

    /// Sleep before answering each call
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every call of `operation` with `message` until [`Self::recover`]
    pub fn fail_always(&self, operation: Operation, message: impl Into<String>) {
        self.state.lock().failures.insert(
            operation,
            Failure {
                message: message.into(),
                remaining: None,
            },
        );
    }

    /// Fail only the next call of `operation`
    pub fn fail_next(&self, operation: Operation, message: impl Into<String>) {
        self.state.lock().failures.insert(
            operation,
            Failure {
                message: message.into(),
                remaining: Some(1),
            },
        );
    }

    /// Stop failing `operation`
    pub fn recover(&self, operation: Operation) {
        self.state.lock().failures.remove(&operation);
    }

    /// Put rows into a table without journaling
    pub fn seed(&self, table: &str, records: impl IntoIterator<Item = Record>) {
        self.state
            .lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(records);
    }

    /// Every call so far, oldest first
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls of one operation
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Forget the journal
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Rows of a table in insertion order
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.state
            .lock()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Stored object, if any
    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<Attachment> {
        self.state
            .lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            sleep(latency).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

/// Apply a sort direction; ties keep their original order under a stable sort
const fn directed(ordering: Ordering, descending: bool) -> Ordering {
    if descending { ordering.reverse() } else { ordering }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryBackend {
    async fn upload(&self, bucket: &str, key: &str, attachment: &Attachment) -> BackendResult<()> {
        self.pause().await;
        let mut state = self.state.lock();
        state.enter(BackendCall::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            len: attachment.len(),
        })?;

        let slot = (bucket.to_string(), key.to_string());
        if state.objects.contains_key(&slot) {
            return Err(BackendError::service("The resource already exists"));
        }
        state.objects.insert(slot, attachment.clone());
        Ok(())
    }

    async fn public_url(&self, bucket: &str, key: &str) -> BackendResult<Option<String>> {
        self.pause().await;
        self.state.lock().enter(BackendCall::PublicUrl {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;

        Ok(self
            .public_base
            .as_ref()
            .map(|base| format!("{base}/{bucket}/{key}")))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl DataStore for InMemoryBackend {
    async fn insert(&self, table: &str, record: &NewRecord) -> BackendResult<()> {
        self.pause().await;
        let mut state = self.state.lock();
        state.enter(BackendCall::Insert {
            table: table.to_string(),
            record: record.clone(),
        })?;

        let id = RecordId::from(state.next_id);
        state.next_id += 1;
        let created_at = state.tick();

        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(Record {
                id,
                name: record.name.clone(),
                category: record.category.clone(),
                description: record.description.clone(),
                description_es: record.description_es.clone(),
                coordinates: record.coordinates.clone(),
                state: record.state.clone(),
                rating: Some(record.rating),
                image_url: Some(record.image_url.clone()),
                approved: record.approved,
                featured: record.featured,
                status: record.status.clone(),
                created_at,
            });
        Ok(())
    }

    async fn update(&self, table: &str, id: &RecordId, fields: &FieldUpdate) -> BackendResult<()> {
        self.pause().await;
        let mut state = self.state.lock();
        state.enter(BackendCall::Update {
            table: table.to_string(),
            id: id.clone(),
            fields: fields.clone(),
        })?;

        let row = state
            .tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| &row.id == id))
            .ok_or_else(|| BackendError::row_not_found(table, id))?;

        for (column, value) in fields {
            let field = column.parse::<ToggleField>().map_err(|_| {
                BackendError::service(format!("column '{column}' cannot be updated"))
            })?;
            let Value::Bool(flag) = value else {
                return Err(BackendError::service(format!(
                    "column '{column}' expects a boolean"
                )));
            };
            match field {
                ToggleField::Approved => row.approved = *flag,
                ToggleField::Featured => row.featured = *flag,
            }
        }
        Ok(())
    }

    async fn select(&self, table: &str, order: &OrderBy) -> BackendResult<Vec<Record>> {
        self.pause().await;
        let mut state = self.state.lock();
        state.enter(BackendCall::Select {
            table: table.to_string(),
            order: order.clone(),
        })?;

        let mut rows = state.tables.get(table).cloned().unwrap_or_default();
        let descending = order.direction == SortDirection::Desc;
        match order.column.as_str() {
            "created_at" => {
                rows.sort_by(|a, b| directed(a.created_at.cmp(&b.created_at), descending));
            }
            "name" => rows.sort_by(|a, b| directed(a.name.cmp(&b.name), descending)),
            other => {
                return Err(BackendError::service(format!(
                    "column '{other}' does not exist"
                )));
            }
        }
        Ok(rows)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
