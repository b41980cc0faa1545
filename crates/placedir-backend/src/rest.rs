//! REST client for the hosted backend
//!
//! Talks to the PostgREST-style table API under `/rest/v1` and the object
//! storage API under `/storage/v1`, authenticating every request with the
//! project API key.

use crate::error::{BackendError, BackendResult};
use crate::service::{DataStore, FieldUpdate, ObjectStorage};
use async_trait::async_trait;
use placedir_core::{Attachment, BackendConfig, NewRecord, OrderBy, Record, RecordId};
use reqwest::{Client, RequestBuilder, Response, header};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Error body shapes returned by the table and storage APIs
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
    details: Option<String>,
}

/// Client for the hosted backend's table and storage APIs
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestBackend {
    /// Create a client from backend settings
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is blank or the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        let base_url = config.url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(BackendError::configuration("backend url is empty"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, urlencoding::encode(table))
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            urlencoding::encode(bucket),
            encode_key(key)
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request
                .header("apikey", &self.api_key)
                .bearer_auth(&self.api_key)
        }
    }

    /// Turn a non-success response into a [`BackendError::Status`]
    async fn check(response: Response) -> BackendResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

        warn!(status = status.as_u16(), %message, "Backend rejected request");
        Err(BackendError::status(status.as_u16(), message))
    }
}

/// Percent-encode each segment of an object key, keeping the separators
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<ErrorBody>(trimmed) {
        Ok(parsed) => parsed
            .message
            .or(parsed.error)
            .or(parsed.details)
            .or_else(|| Some(trimmed.to_string())),
        Err(_) => Some(trimmed.to_string()),
    }
}

#[async_trait]
impl ObjectStorage for RestBackend {
    async fn upload(&self, bucket: &str, key: &str, attachment: &Attachment) -> BackendResult<()> {
        debug!(bucket, key, bytes = attachment.len(), "Uploading object");

        let request = self
            .client
            .post(self.object_url(bucket, key))
            .header(header::CONTENT_TYPE, &attachment.content_type)
            .header("x-upsert", "false")
            .body(attachment.bytes.clone());

        Self::check(self.authorize(request).send().await?).await?;
        Ok(())
    }

    async fn public_url(&self, bucket: &str, key: &str) -> BackendResult<Option<String>> {
        Ok(Some(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            urlencoding::encode(bucket),
            encode_key(key)
        )))
    }

    fn name(&self) -> &str {
        "rest"
    }
}

#[async_trait]
impl DataStore for RestBackend {
    async fn insert(&self, table: &str, record: &NewRecord) -> BackendResult<()> {
        debug!(table, name = %record.name, "Inserting record");

        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=minimal")
            .json(record);

        Self::check(self.authorize(request).send().await?).await?;
        Ok(())
    }

    async fn update(&self, table: &str, id: &RecordId, fields: &FieldUpdate) -> BackendResult<()> {
        debug!(table, %id, ?fields, "Updating record");

        let request = self
            .client
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(fields);

        let response = Self::check(self.authorize(request).send().await?).await?;
        let updated: Vec<serde_json::Value> = response.json().await?;
        if updated.is_empty() {
            return Err(BackendError::row_not_found(table, id));
        }
        Ok(())
    }

    async fn select(&self, table: &str, order: &OrderBy) -> BackendResult<Vec<Record>> {
        debug!(table, column = %order.column, direction = order.direction.as_str(), "Selecting records");

        let request = self.client.get(self.table_url(table)).query(&[
            ("select", "*".to_string()),
            (
                "order",
                format!("{}.{}", order.column, order.direction.as_str()),
            ),
        ]);

        let response = Self::check(self.authorize(request).send().await?).await?;
        Ok(response.json().await?)
    }

    fn name(&self) -> &str {
        "rest"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use placedir_core::{CreationFlags, Draft, DraftField};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> RestBackend {
        let config = BackendConfig {
            url: format!("{}/", server.uri()),
            api_key: "anon-key".to_string(),
            ..BackendConfig::default()
        };
        RestBackend::new(&config).unwrap()
    }

    fn sample_record() -> NewRecord {
        let mut draft = Draft::default();
        draft.set(DraftField::Name, "Playa Sol");
        draft.set(DraftField::Coordinates, "[24.1,-110.3]");
        NewRecord::from_draft(&draft, "", CreationFlags::ForceFalse, None)
    }

    #[test]
    fn test_empty_url_rejected() {
        let config = BackendConfig {
            url: "  ".to_string(),
            ..BackendConfig::default()
        };
        assert!(matches!(
            RestBackend::new(&config),
            Err(BackendError::Configuration { .. })
        ));
    }

    #[test]
    fn test_encode_key_keeps_separators() {
        assert_eq!(encode_key("admin/1-a b.jpg"), "admin/1-a%20b.jpg");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"code":"23505","message":"duplicate key"}"#).as_deref(),
            Some("duplicate key")
        );
        assert_eq!(
            error_message(r#"{"statusCode":"400","error":"Duplicate"}"#).as_deref(),
            Some("Duplicate")
        );
        assert_eq!(error_message("gateway down").as_deref(), Some("gateway down"));
        assert_eq!(error_message("  "), None);
    }

    #[tokio::test]
    async fn test_insert_posts_payload_with_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/places"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .and(body_json(json!({
                "name": "Playa Sol",
                "coordinates": "[24.1,-110.3]",
                "rating": 0.0,
                "image_url": "",
                "approved": false,
                "featured": false
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        backend.insert("places", &sample_record()).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_failure_carries_service_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/places"))
            .respond_with(
                ResponseTemplate::new(409)
                    .set_body_json(json!({"code": "23505", "message": "duplicate key"})),
            )
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .insert("places", &sample_record())
            .await
            .unwrap_err();

        assert_eq!(err.http_status(), Some(409));
        assert_eq!(err.to_string(), "duplicate key (HTTP 409)");
    }

    #[tokio::test]
    async fn test_select_orders_newest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/locations"))
            .and(query_param("select", "*"))
            .and(query_param("order", "created_at.desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 2, "name": "B", "created_at": "2024-02-01T00:00:00Z", "approved": true},
                {"id": 1, "name": "A", "created_at": "2024-01-01T00:00:00Z"}
            ])))
            .mount(&server)
            .await;

        let records = backend_for(&server)
            .select("locations", &OrderBy::newest_first())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "B");
        assert!(records[0].approved);
        assert_eq!(records[1].id, RecordId::from(1));
    }

    #[tokio::test]
    async fn test_update_filters_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/places"))
            .and(query_param("id", "eq.7"))
            .and(body_json(json!({"featured": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}])))
            .expect(1)
            .mount(&server)
            .await;

        let fields = crate::service::flag_update(placedir_core::ToggleField::Featured, true);
        backend_for(&server)
            .update("places", &RecordId::from(7), &fields)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_with_no_matching_row() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/places"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let fields = crate::service::flag_update(placedir_core::ToggleField::Approved, true);
        let err = backend_for(&server)
            .update("places", &RecordId::from(99), &fields)
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::RowNotFound { .. }));
    }

    #[tokio::test]
    async fn test_upload_sends_bytes_and_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/places-images/admin/1700000000000-beach.png"))
            .and(header("content-type", "image/png"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Key": "x"})))
            .expect(1)
            .mount(&server)
            .await;

        let attachment = Attachment::new("beach.png", vec![137_u8, 80, 78, 71]);
        backend_for(&server)
            .upload("places-images", "admin/1700000000000-beach.png", &attachment)
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received[0].body, vec![137_u8, 80, 78, 71]);
    }

    #[tokio::test]
    async fn test_upload_failure_carries_storage_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"statusCode": "400", "error": "Duplicate", "message": "The resource already exists"})),
            )
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .upload("places-images", "admin/a.png", &Attachment::new("a.png", vec![1_u8]))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "The resource already exists (HTTP 400)");
    }

    #[tokio::test]
    async fn test_public_url_is_derived_locally() {
        let server = MockServer::start().await;
        let backend = backend_for(&server);

        let url = backend
            .public_url("places-images", "admin/1-beach.png")
            .await
            .unwrap();

        assert_eq!(
            url,
            Some(format!(
                "{}/storage/v1/object/public/places-images/admin/1-beach.png",
                server.uri()
            ))
        );
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
