//! List synchronizer: the displayed record collection and flag toggles

use parking_lot::{Mutex, RwLock};
use placedir_backend::{DataStore, flag_update};
use placedir_core::{Error, OrderBy, Record, RecordId, Result, ToggleField};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// One row of the admin table, ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordRow {
    /// Record identifier
    pub id: RecordId,
    /// Display name
    pub name: String,
    /// Category, empty when unset
    pub category: String,
    /// Coerced rating
    pub rating: f64,
    /// Whether an image is attached
    pub has_image: bool,
    /// Approval flag
    pub approved: bool,
    /// Feature flag
    pub featured: bool,
    /// Label of the approve/unapprove action
    pub approve_action: &'static str,
    /// Label of the feature/unfeature action
    pub feature_action: &'static str,
}

impl From<&Record> for RecordRow {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            category: record.category.clone().unwrap_or_default(),
            rating: record.rating_or_default(),
            has_image: record.has_image(),
            approved: record.approved,
            featured: record.featured,
            approve_action: ToggleField::Approved.action_label(record.approved),
            feature_action: ToggleField::Featured.action_label(record.featured),
        }
    }
}

#[derive(Debug)]
struct Snapshot {
    generation: u64,
    records: Arc<[Record]>,
}

/// Keeps the displayed list in step with the data store
pub struct ListSynchronizer {
    store: Arc<dyn DataStore>,
    table: String,
    snapshot: RwLock<Snapshot>,
    generations: AtomicU64,
    in_flight: Mutex<HashSet<RecordId>>,
}

impl fmt::Debug for ListSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListSynchronizer")
            .field("store", &self.store.name())
            .field("table", &self.table)
            .field("records", &self.snapshot.read().records.len())
            .finish_non_exhaustive()
    }
}

impl ListSynchronizer {
    /// Create a synchronizer with an empty snapshot
    pub fn new(store: Arc<dyn DataStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            snapshot: RwLock::new(Snapshot {
                generation: 0,
                records: Arc::from(Vec::new()),
            }),
            generations: AtomicU64::new(0),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Table being displayed
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Last successfully fetched records, newest first
    #[must_use]
    pub fn snapshot(&self) -> Arc<[Record]> {
        Arc::clone(&self.snapshot.read().records)
    }

    /// Record with `id` from the current snapshot
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.snapshot
            .read()
            .records
            .iter()
            .find(|record| &record.id == id)
            .cloned()
    }

    /// Display rows for the current snapshot
    #[must_use]
    pub fn rows(&self) -> Vec<RecordRow> {
        self.snapshot().iter().map(RecordRow::from).collect()
    }

    /// Number of records in the snapshot
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.read().records.len()
    }

    /// Whether the snapshot is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch every record and replace the snapshot
    ///
    /// Records are ordered by `created_at` descending; rows with equal
    /// timestamps keep the order the store returned them in. When two
    /// refreshes overlap, the one started last wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] if the store fails; the previous snapshot is
    /// kept.
    pub async fn refresh(&self) -> Result<Arc<[Record]>> {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;

        let mut records = match self.store.select(&self.table, &OrderBy::newest_first()).await {
            Ok(records) => records,
            Err(err) => {
                warn!(table = %self.table, error = %err, "Refresh failed; keeping previous snapshot");
                return Err(Error::Fetch(err.to_string()));
            }
        };
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let records: Arc<[Record]> = records.into();

        let mut snapshot = self.snapshot.write();
        if generation > snapshot.generation {
            snapshot.generation = generation;
            snapshot.records = Arc::clone(&records);
            debug!(table = %self.table, count = records.len(), "Snapshot replaced");
        } else {
            debug!(table = %self.table, generation, "Discarding stale refresh");
        }
        Ok(records)
    }

    /// Flip one boolean flag of a record, then refresh
    ///
    /// The new value is the negation of the value in the current snapshot.
    /// Returns that value.
    ///
    /// # Errors
    ///
    /// - [`Error::OperationInFlight`] if the record already has a toggle running
    /// - [`Error::NotFound`] if the record is not in the snapshot
    /// - [`Error::Update`] if the store rejects the update; no refresh is made
    /// - [`Error::Fetch`] if the update landed but the refresh failed
    pub async fn toggle(&self, id: &RecordId, field: ToggleField) -> Result<bool> {
        let _claim = self.claim(id)?;

        let current = self
            .get(id)
            .ok_or_else(|| Error::NotFound {
                resource: format!("record {id} in {}", self.table),
            })?
            .flag(field);
        let value = !current;

        self.store
            .update(&self.table, id, &flag_update(field, value))
            .await
            .map_err(|e| {
                warn!(table = %self.table, %id, %field, error = %e, "Toggle rejected");
                Error::Update(e.to_string())
            })?;
        info!(table = %self.table, %id, %field, value, "Flag updated");

        self.refresh().await?;
        Ok(value)
    }

    fn claim(&self, id: &RecordId) -> Result<InFlight<'_>> {
        if !self.in_flight.lock().insert(id.clone()) {
            return Err(Error::OperationInFlight {
                resource: format!("record {id}"),
            });
        }
        Ok(InFlight {
            list: self,
            id: id.clone(),
        })
    }
}

/// Marks a record busy until dropped
struct InFlight<'a> {
    list: &'a ListSynchronizer,
    id: RecordId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.list.in_flight.lock().remove(&self.id);
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]
mod tests {
    use super::*;
    use placedir_backend::{BackendCall, InMemoryBackend, Operation};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn record(id: i64, name: &str, created_at: &str) -> Record {
        Record {
            id: RecordId::from(id),
            name: name.to_string(),
            category: None,
            description: None,
            description_es: None,
            coordinates: Some("[0,0]".to_string()),
            state: None,
            rating: None,
            image_url: None,
            approved: false,
            featured: false,
            status: None,
            created_at: created_at.parse().unwrap(),
        }
    }

    fn seeded() -> (InMemoryBackend, ListSynchronizer) {
        let backend = InMemoryBackend::new();
        backend.seed(
            "places",
            vec![
                record(1, "Old", "2024-01-01T00:00:00Z"),
                record(2, "New", "2024-03-01T00:00:00Z"),
                record(3, "Mid", "2024-02-01T00:00:00Z"),
            ],
        );
        let list = ListSynchronizer::new(Arc::new(backend.clone()), "places");
        (backend, list)
    }

    fn names(records: &[Record]) -> Vec<&str> {
        records.iter().map(|record| record.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_refresh_orders_newest_first() {
        let (backend, list) = seeded();
        assert!(list.is_empty());

        let records = list.refresh().await.unwrap();

        assert_eq!(names(&records), vec!["New", "Mid", "Old"]);
        assert_eq!(list.len(), 3);
        assert_eq!(backend.count(Operation::Select), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_snapshot() {
        let (backend, list) = seeded();
        list.refresh().await.unwrap();
        let before = list.snapshot();

        backend.fail_next(Operation::Select, "connection reset");
        let err = list.refresh().await.unwrap_err();

        assert!(matches!(&err, Error::Fetch(message) if message == "connection reset"));
        assert_eq!(list.snapshot(), before);
    }

    #[tokio::test]
    async fn test_toggle_updates_then_refreshes() {
        let (backend, list) = seeded();
        list.refresh().await.unwrap();
        backend.clear_calls();

        let value = list.toggle(&RecordId::from(3), ToggleField::Approved).await.unwrap();

        assert!(value);
        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        let BackendCall::Update { id, fields, .. } = &calls[0] else {
            panic!("expected update, got {:?}", calls[0]);
        };
        assert_eq!(id, &RecordId::from(3));
        assert_eq!(fields, &flag_update(ToggleField::Approved, true));
        assert_eq!(calls[1].operation(), Operation::Select);
        assert!(list.get(&RecordId::from(3)).unwrap().approved);
    }

    #[tokio::test]
    async fn test_double_toggle_restores_value() {
        let (_backend, list) = seeded();
        list.refresh().await.unwrap();
        let id = RecordId::from(2);

        assert!(list.toggle(&id, ToggleField::Featured).await.unwrap());
        assert!(!list.toggle(&id, ToggleField::Featured).await.unwrap());
        assert!(!list.get(&id).unwrap().featured);
    }

    #[tokio::test]
    async fn test_failed_toggle_leaves_snapshot() {
        let (backend, list) = seeded();
        list.refresh().await.unwrap();
        let before = list.snapshot();
        backend.clear_calls();
        backend.fail_next(Operation::Update, "row locked");

        let err = list
            .toggle(&RecordId::from(1), ToggleField::Approved)
            .await
            .unwrap_err();

        assert!(matches!(&err, Error::Update(message) if message == "row locked"));
        assert_eq!(list.snapshot(), before);
        assert_eq!(backend.count(Operation::Select), 0);
    }

    #[tokio::test]
    async fn test_toggle_unknown_record() {
        let (backend, list) = seeded();
        list.refresh().await.unwrap();
        backend.clear_calls();

        let err = list
            .toggle(&RecordId::from(99), ToggleField::Approved)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_reports_refresh_failure() {
        let (backend, list) = seeded();
        list.refresh().await.unwrap();
        backend.fail_next(Operation::Select, "timeout");

        let err = list
            .toggle(&RecordId::from(1), ToggleField::Featured)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Fetch(_)));
        assert!(backend.rows("places")[0].featured);
        assert!(!list.get(&RecordId::from(1)).unwrap().featured);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_toggle_same_record_is_refused() {
        let backend = InMemoryBackend::new().with_latency(Duration::from_millis(20));
        backend.seed("places", vec![record(1, "A", "2024-01-01T00:00:00Z")]);
        let list = ListSynchronizer::new(Arc::new(backend.clone()), "places");
        list.refresh().await.unwrap();
        let id = RecordId::from(1);

        let (first, second) = tokio::join!(
            list.toggle(&id, ToggleField::Approved),
            list.toggle(&id, ToggleField::Featured)
        );

        assert!(first.unwrap());
        assert!(matches!(second, Err(Error::OperationInFlight { .. })));
        assert_eq!(backend.count(Operation::Update), 1);

        // Released once the first toggle completes.
        assert!(list.toggle(&id, ToggleField::Featured).await.unwrap());
    }

    #[tokio::test]
    async fn test_rows_carry_action_labels() {
        let (_backend, list) = seeded();
        list.refresh().await.unwrap();
        list.toggle(&RecordId::from(2), ToggleField::Approved).await.unwrap();

        let rows = list.rows();

        assert_eq!(rows[0].name, "New");
        assert_eq!(rows[0].approve_action, "Unapprove");
        assert_eq!(rows[0].feature_action, "Feature");
        assert_eq!(rows[1].approve_action, "Approve");
        assert_eq!(rows[0].rating, 0.0);
        assert!(!rows[0].has_image);
    }
}
