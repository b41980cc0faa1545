//! Entry manager: wires the form controller to the list synchronizer

use crate::form::{FormController, Submission};
use crate::list::ListSynchronizer;
use placedir_backend::{DataStore, ObjectStorage};
use placedir_core::{DirectoryConfig, Error, Record, RecordId, Result, ToggleField};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Outcome of a submit that reached the data store
#[derive(Debug)]
pub struct SubmitOutcome {
    /// What was inserted
    pub submission: Submission,
    /// Refresh failure after a successful insert; the record still exists
    pub refresh_error: Option<Error>,
}

impl SubmitOutcome {
    /// Whether the list now shows the new record
    #[must_use]
    pub const fn is_listed(&self) -> bool {
        self.refresh_error.is_none()
    }
}

/// Admin surface for one directory table
#[derive(Debug)]
pub struct EntryManager {
    form: FormController,
    list: ListSynchronizer,
}

impl EntryManager {
    /// Build a manager over the two collaborators
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `directory` fails its checks.
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        store: Arc<dyn DataStore>,
        directory: DirectoryConfig,
    ) -> Result<Self> {
        directory.check()?;

        let list = ListSynchronizer::new(Arc::clone(&store), directory.table.clone());
        let form = FormController::new(storage, store, directory);
        Ok(Self { form, list })
    }

    /// Build a manager over a backend that provides both contracts
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `directory` fails its checks.
    pub fn with_backend<B>(backend: Arc<B>, directory: DirectoryConfig) -> Result<Self>
    where
        B: ObjectStorage + DataStore + 'static,
    {
        Self::new(backend.clone(), backend, directory)
    }

    /// Draft editing and submission
    #[must_use]
    pub const fn form(&self) -> &FormController {
        &self.form
    }

    /// Displayed records
    #[must_use]
    pub const fn list(&self) -> &ListSynchronizer {
        &self.list
    }

    /// Initial load of the list
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] if the store fails.
    pub async fn load(&self) -> Result<Arc<[Record]>> {
        self.list.refresh().await
    }

    /// Submit the draft and refresh the list
    ///
    /// A refresh failure after the insert is reported in the outcome rather
    /// than as an error, since the record was created.
    ///
    /// # Errors
    ///
    /// Any error from [`FormController::submit`].
    #[instrument(skip(self), fields(table = %self.list.table()))]
    pub async fn submit(&self) -> Result<SubmitOutcome> {
        let submission = self.form.submit().await?;

        let refresh_error = match self.list.refresh().await {
            Ok(records) => {
                info!(count = records.len(), "List refreshed after submit");
                None
            }
            Err(err) => {
                warn!(error = %err, "Record created but list refresh failed");
                Some(err)
            }
        };

        Ok(SubmitOutcome {
            submission,
            refresh_error,
        })
    }

    /// Flip a flag on a listed record
    ///
    /// # Errors
    ///
    /// Any error from [`ListSynchronizer::toggle`].
    pub async fn toggle(&self, id: &RecordId, field: ToggleField) -> Result<bool> {
        self.list.toggle(id, field).await
    }
}
