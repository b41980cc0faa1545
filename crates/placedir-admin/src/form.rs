//! Form controller: draft state, validation and the upload-then-insert submit

use parking_lot::Mutex;
use placedir_backend::{DataStore, ObjectStorage};
use placedir_core::utils::storage_key;
use placedir_core::{
    Attachment, DirectoryConfig, Draft, DraftField, Error, NewRecord, Result, ToggleField,
    UrlLookupPolicy,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the form is in its submit cycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FormStatus {
    /// Editable, nothing pending
    #[default]
    Idle,
    /// A submission is running; edits and further submits are refused
    Submitting,
    /// The last submission was persisted
    Succeeded,
    /// The last submission failed with this message
    Failed(String),
}

/// Result of a persisted submission
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Payload that was inserted
    pub record: NewRecord,
    /// Object key of the uploaded image, if there was one
    pub image_key: Option<String>,
}

#[derive(Debug, Default)]
struct FormState {
    draft: Draft,
    attachment: Option<Attachment>,
    status: FormStatus,
}

/// Owns a draft and turns it into a persisted record
pub struct FormController {
    storage: Arc<dyn ObjectStorage>,
    store: Arc<dyn DataStore>,
    directory: DirectoryConfig,
    state: Mutex<FormState>,
}

impl fmt::Debug for FormController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormController")
            .field("storage", &self.storage.name())
            .field("store", &self.store.name())
            .field("table", &self.directory.table)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl FormController {
    /// Create a controller with an empty draft
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        store: Arc<dyn DataStore>,
        directory: DirectoryConfig,
    ) -> Self {
        Self {
            storage,
            store,
            directory,
            state: Mutex::new(FormState::default()),
        }
    }

    /// Directory settings the controller submits against
    #[must_use]
    pub const fn directory(&self) -> &DirectoryConfig {
        &self.directory
    }

    /// Set one draft field; values are not checked until submit
    ///
    /// # Errors
    ///
    /// Returns [`Error::SubmissionInFlight`] while a submission is running.
    pub fn update_field(&self, field: DraftField, value: impl Into<String>) -> Result<()> {
        self.edit(|state| state.draft.set(field, value))
    }

    /// Set one creation checkbox
    ///
    /// # Errors
    ///
    /// Returns [`Error::SubmissionInFlight`] while a submission is running.
    pub fn set_flag(&self, field: ToggleField, value: bool) -> Result<()> {
        self.edit(|state| state.draft.set_flag(field, value))
    }

    /// Replace or clear the pending attachment
    ///
    /// # Errors
    ///
    /// Returns [`Error::SubmissionInFlight`] while a submission is running.
    pub fn set_attachment(&self, attachment: Option<Attachment>) -> Result<()> {
        self.edit(|state| state.attachment = attachment)
    }

    /// Copy of the current draft
    #[must_use]
    pub fn draft(&self) -> Draft {
        self.state.lock().draft.clone()
    }

    /// Copy of the pending attachment
    #[must_use]
    pub fn attachment(&self) -> Option<Attachment> {
        self.state.lock().attachment.clone()
    }

    /// Current submit status
    #[must_use]
    pub fn status(&self) -> FormStatus {
        self.state.lock().status.clone()
    }

    /// Whether a submission is running
    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.state.lock().status == FormStatus::Submitting
    }

    /// Validate, upload the attachment if any, then insert the record
    ///
    /// On success the draft and attachment are cleared. On failure both are
    /// kept so the operator can retry. An image uploaded before a failed
    /// insert stays in storage.
    ///
    /// # Errors
    ///
    /// - [`Error::SubmissionInFlight`] if another submit is running
    /// - [`Error::Validation`] if a required field is blank (no backend call)
    /// - [`Error::Upload`] if the upload fails, or the public URL is missing
    ///   under [`UrlLookupPolicy::Fail`]
    /// - [`Error::Persist`] if the insert fails
    pub async fn submit(&self) -> Result<Submission> {
        let (draft, attachment) = self.begin()?;
        let guard = SubmitGuard { form: self };

        let result = self.persist(&draft, attachment.as_ref()).await;
        guard.finish(&result);
        result
    }

    fn edit(&self, apply: impl FnOnce(&mut FormState)) -> Result<()> {
        let mut state = self.state.lock();
        if state.status == FormStatus::Submitting {
            return Err(Error::SubmissionInFlight);
        }
        apply(&mut state);
        state.status = FormStatus::Idle;
        Ok(())
    }

    /// Enter `Submitting` with a copy of the draft, or refuse
    fn begin(&self) -> Result<(Draft, Option<Attachment>)> {
        let mut state = self.state.lock();
        if state.status == FormStatus::Submitting {
            return Err(Error::SubmissionInFlight);
        }

        if let Err(err) = state.draft.validate(&self.directory.required_fields) {
            debug!(error = %err, "Draft rejected before submit");
            state.status = FormStatus::Failed(err.to_string());
            return Err(err);
        }

        state.status = FormStatus::Submitting;
        Ok((state.draft.clone(), state.attachment.clone()))
    }

    async fn persist(&self, draft: &Draft, attachment: Option<&Attachment>) -> Result<Submission> {
        let directory = &self.directory;

        let image_key = match attachment {
            Some(attachment) => Some(self.upload(attachment).await?),
            None => None,
        };

        let image_url = match &image_key {
            Some(key) => self.resolve_public_url(key).await?,
            None => String::new(),
        };

        let record = NewRecord::from_draft(
            draft,
            image_url,
            directory.creation_flags,
            directory.initial_status.as_deref(),
        );

        if let Err(err) = self.store.insert(&directory.table, &record).await {
            if let Some(key) = &image_key {
                warn!(
                    bucket = %directory.bucket,
                    key = %key,
                    "Insert failed after upload; object left in storage"
                );
            }
            return Err(Error::Persist(err.to_string()));
        }

        info!(
            table = %directory.table,
            name = %record.name,
            image = image_key.is_some(),
            "Record created"
        );
        Ok(Submission { record, image_key })
    }

    async fn upload(&self, attachment: &Attachment) -> Result<String> {
        let directory = &self.directory;
        let key = storage_key(
            &directory.namespace,
            &attachment.filename,
            chrono::Utc::now().timestamp_millis(),
            directory.key_style,
        );

        debug!(bucket = %directory.bucket, key = %key, bytes = attachment.len(), "Uploading attachment");
        self.storage
            .upload(&directory.bucket, &key, attachment)
            .await
            .map_err(|e| Error::Upload(e.to_string()))?;
        Ok(key)
    }

    async fn resolve_public_url(&self, key: &str) -> Result<String> {
        let bucket = &self.directory.bucket;
        let reason = match self.storage.public_url(bucket, key).await {
            Ok(Some(url)) if !url.is_empty() => return Ok(url),
            Ok(_) => "no public URL returned".to_string(),
            Err(err) => err.to_string(),
        };

        match self.directory.url_lookup {
            UrlLookupPolicy::UseEmptyString => {
                warn!(bucket = %bucket, key, %reason, "Public URL lookup failed; storing empty image_url");
                Ok(String::new())
            }
            UrlLookupPolicy::Fail => Err(Error::Upload(format!(
                "public URL for {key} unavailable: {reason}"
            ))),
        }
    }
}

/// Leaves `Submitting` even if the submit future is dropped mid-flight
struct SubmitGuard<'a> {
    form: &'a FormController,
}

impl SubmitGuard<'_> {
    fn finish(self, result: &Result<Submission>) {
        let mut state = self.form.state.lock();
        match result {
            Ok(_) => {
                state.draft = Draft::default();
                state.attachment = None;
                state.status = FormStatus::Succeeded;
            }
            Err(err) => state.status = FormStatus::Failed(err.to_string()),
        }
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.form.state.lock();
        if state.status == FormStatus::Submitting {
            state.status = FormStatus::Failed("submission was abandoned".to_string());
        }
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
    use placedir_core::{CreationFlags, Profile, StorageKeyStyle};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::time::Duration;

    fn controller(backend: &InMemoryBackend, directory: DirectoryConfig) -> FormController {
        let backend = Arc::new(backend.clone());
        FormController::new(backend.clone(), backend, directory)
    }

    fn fill_beach(form: &FormController) {
        form.update_field(DraftField::Name, "Playa Sol").unwrap();
        form.update_field(DraftField::Coordinates, "[24.1,-110.3]").unwrap();
        form.update_field(DraftField::Description, "nice beach").unwrap();
    }

    #[rstest]
    #[case("", "[24.1,-110.3]")]
    #[case("Playa Sol", "")]
    #[case("", "")]
    #[case("  ", "[1,2]")]
    #[tokio::test]
    async fn test_missing_required_fields_make_no_calls(#[case] name: &str, #[case] coordinates: &str) {
        let backend = InMemoryBackend::new();
        let form = controller(&backend, DirectoryConfig::default());
        form.update_field(DraftField::Name, name).unwrap();
        form.update_field(DraftField::Coordinates, coordinates).unwrap();
        form.set_attachment(Some(Attachment::new("a.png", vec![1_u8]))).unwrap();

        let err = form.submit().await.unwrap_err();

        assert!(err.is_validation());
        assert!(backend.calls().is_empty());
        assert!(matches!(form.status(), FormStatus::Failed(_)));
        assert!(form.attachment().is_some());
    }

    #[tokio::test]
    async fn test_strict_profile_requires_description() {
        let backend = InMemoryBackend::new();
        let form = controller(&backend, Profile::PlacesStrict.directory());
        form.update_field(DraftField::Name, "Playa Sol").unwrap();
        form.update_field(DraftField::Coordinates, "[24.1,-110.3]").unwrap();

        let err = form.submit().await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Validation error: description - Description is required."
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_submit_without_attachment() {
        let backend = InMemoryBackend::new();
        let form = controller(&backend, DirectoryConfig::default());
        fill_beach(&form);

        let submission = form.submit().await.unwrap();

        assert_eq!(backend.count(Operation::Upload), 0);
        assert_eq!(backend.count(Operation::Insert), 1);
        assert_eq!(submission.record.image_url, "");
        assert_eq!(submission.record.rating, 0.0);
        assert!(submission.image_key.is_none());
        assert_eq!(form.status(), FormStatus::Succeeded);
        assert_eq!(form.draft(), Draft::default());
    }

    #[tokio::test]
    async fn test_submit_with_attachment_uploads_before_insert() {
        let backend = InMemoryBackend::new();
        let form = controller(&backend, DirectoryConfig::default());
        fill_beach(&form);
        form.set_attachment(Some(Attachment::new("beach.jpg", vec![0xFF_u8, 0xD8])))
            .unwrap();

        let submission = form.submit().await.unwrap();
        let key = submission.image_key.clone().unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(&calls[0], BackendCall::Upload { key: k, .. } if *k == key));
        assert!(matches!(&calls[1], BackendCall::PublicUrl { .. }));
        let BackendCall::Insert { record, .. } = &calls[2] else {
            panic!("expected insert, got {:?}", calls[2]);
        };
        assert_eq!(record.image_url, format!("memory://public/places-images/{key}"));
        assert!(key.starts_with("admin/"));
        assert!(key.ends_with("-beach.jpg"));
        assert!(form.attachment().is_none());
    }

    #[tokio::test]
    async fn test_extension_key_style() {
        let backend = InMemoryBackend::new();
        let directory = DirectoryConfig {
            key_style: StorageKeyStyle::TimestampedExtension,
            namespace: "locations".to_string(),
            ..DirectoryConfig::default()
        };
        let form = controller(&backend, directory);
        fill_beach(&form);
        form.set_attachment(Some(Attachment::new("Beach Photo.PNG", vec![1_u8])))
            .unwrap();

        let key = form.submit().await.unwrap().image_key.unwrap();

        assert!(key.starts_with("locations/"));
        assert!(key.ends_with(".png"));
        assert!(!key.contains("Beach"));
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_draft_and_skips_insert() {
        let backend = InMemoryBackend::new();
        backend.fail_next(Operation::Upload, "network timeout");
        let form = controller(&backend, DirectoryConfig::default());
        fill_beach(&form);
        form.set_attachment(Some(Attachment::new("beach.jpg", vec![1_u8])))
            .unwrap();
        let before = form.draft();

        let err = form.submit().await.unwrap_err();

        assert!(matches!(&err, Error::Upload(message) if message == "network timeout"));
        assert_eq!(backend.count(Operation::Insert), 0);
        assert_eq!(form.draft(), before);
        assert!(form.attachment().is_some());
        assert_eq!(form.status(), FormStatus::Failed(err.to_string()));
    }

    #[tokio::test]
    async fn test_missing_public_url_uses_empty_string() {
        let backend = InMemoryBackend::new().without_public_urls();
        let form = controller(&backend, DirectoryConfig::default());
        fill_beach(&form);
        form.set_attachment(Some(Attachment::new("beach.jpg", vec![1_u8])))
            .unwrap();

        let submission = form.submit().await.unwrap();

        assert_eq!(submission.record.image_url, "");
        assert!(submission.image_key.is_some());
        assert_eq!(backend.count(Operation::Insert), 1);
    }

    #[tokio::test]
    async fn test_public_url_error_uses_empty_string() {
        let backend = InMemoryBackend::new();
        backend.fail_next(Operation::PublicUrl, "signing service down");
        let form = controller(&backend, DirectoryConfig::default());
        fill_beach(&form);
        form.set_attachment(Some(Attachment::new("beach.jpg", vec![1_u8])))
            .unwrap();

        let submission = form.submit().await.unwrap();
        assert_eq!(submission.record.image_url, "");
    }

    #[tokio::test]
    async fn test_missing_public_url_fails_under_strict_policy() {
        let backend = InMemoryBackend::new().without_public_urls();
        let directory = DirectoryConfig {
            url_lookup: UrlLookupPolicy::Fail,
            ..DirectoryConfig::default()
        };
        let form = controller(&backend, directory);
        fill_beach(&form);
        form.set_attachment(Some(Attachment::new("beach.jpg", vec![1_u8])))
            .unwrap();

        let err = form.submit().await.unwrap_err();

        assert!(matches!(err, Error::Upload(_)));
        assert_eq!(backend.count(Operation::Insert), 0);
        assert_eq!(form.draft().name, "Playa Sol");
    }

    #[tokio::test]
    async fn test_insert_failure_keeps_draft_and_orphans_upload() {
        let backend = InMemoryBackend::new();
        backend.fail_next(Operation::Insert, "permission denied");
        let form = controller(&backend, DirectoryConfig::default());
        fill_beach(&form);
        form.set_attachment(Some(Attachment::new("beach.jpg", vec![1_u8])))
            .unwrap();

        let err = form.submit().await.unwrap_err();

        assert!(matches!(&err, Error::Persist(message) if message == "permission denied"));
        assert_eq!(form.draft().name, "Playa Sol");
        assert!(form.attachment().is_some());
        let uploaded_key = backend
            .calls()
            .into_iter()
            .find_map(|call| match call {
                BackendCall::Upload { key, .. } => Some(key),
                _ => None,
            })
            .unwrap();
        assert!(backend.object("places-images", &uploaded_key).is_some());

        // Operator retry goes through with a fresh key.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let submission = form.submit().await.unwrap();
        assert_ne!(submission.image_key, Some(uploaded_key));
        assert_eq!(backend.rows("places").len(), 1);
    }

    #[tokio::test]
    async fn test_creation_flags_policy() {
        let backend = InMemoryBackend::new();
        let form = controller(&backend, DirectoryConfig::default());
        fill_beach(&form);
        form.set_flag(ToggleField::Approved, true).unwrap();
        form.set_flag(ToggleField::Featured, true).unwrap();
        let forced = form.submit().await.unwrap();
        assert!(!forced.record.approved);
        assert!(!forced.record.featured);

        let directory = DirectoryConfig {
            creation_flags: CreationFlags::FromDraft,
            ..DirectoryConfig::default()
        };
        let form = controller(&backend, directory);
        fill_beach(&form);
        form.set_flag(ToggleField::Featured, true).unwrap();
        let honoured = form.submit().await.unwrap();
        assert!(!honoured.record.approved);
        assert!(honoured.record.featured);
    }

    #[tokio::test]
    async fn test_strict_profile_payload() {
        let backend = InMemoryBackend::new();
        let form = controller(&backend, Profile::PlacesStrict.directory());
        fill_beach(&form);
        form.update_field(DraftField::Rating, "4.5").unwrap();

        let submission = form.submit().await.unwrap();

        assert_eq!(submission.record.status.as_deref(), Some("pending"));
        assert_eq!(submission.record.rating, 4.5);
        assert_eq!(backend.rows("places")[0].status.as_deref(), Some("pending"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submit_is_refused() {
        let backend = InMemoryBackend::new().with_latency(Duration::from_millis(50));
        let form = controller(&backend, DirectoryConfig::default());
        fill_beach(&form);

        let (first, second) = tokio::join!(form.submit(), async {
            tokio::task::yield_now().await;
            assert!(form.is_submitting());
            assert!(matches!(
                form.update_field(DraftField::Name, "other"),
                Err(Error::SubmissionInFlight)
            ));
            form.submit().await
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(Error::SubmissionInFlight)));
        assert_eq!(backend.count(Operation::Insert), 1);
    }

    #[tokio::test]
    async fn test_edit_returns_to_idle() {
        let backend = InMemoryBackend::new();
        let form = controller(&backend, DirectoryConfig::default());

        assert!(form.submit().await.is_err());
        assert!(matches!(form.status(), FormStatus::Failed(_)));

        form.update_field(DraftField::Name, "x").unwrap();
        assert_eq!(form.status(), FormStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_submit_releases_form() {
        let backend = InMemoryBackend::new().with_latency(Duration::from_secs(10));
        let form = controller(&backend, DirectoryConfig::default());
        fill_beach(&form);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), form.submit()).await;

        assert!(abandoned.is_err());
        assert!(!form.is_submitting());
        assert_eq!(form.draft().name, "Playa Sol");
    }
}
