//! Error types for the backend collaborators

use thiserror::Error;

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur while talking to object storage or the data store
#[derive(Error, Debug)]
pub enum BackendError {
    /// The service answered and reported a failure
    #[error("{message}")]
    Service {
        /// Message reported by the service
        message: String,
    },

    /// Non-success HTTP status
    #[error("{message} (HTTP {status})")]
    Status {
        /// HTTP status code
        status: u16,
        /// Message extracted from the response body
        message: String,
    },

    /// No row matched an update
    #[error("No row with id {id} in table {table}")]
    RowNotFound {
        /// Table that was updated
        table: String,
        /// Identifier that matched nothing
        id: String,
    },

    /// Client could not be built from the configuration
    #[error("Invalid backend configuration: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackendError {
    /// Create a service-reported error
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Create a missing-row error
    pub fn row_not_found(table: impl Into<String>, id: impl ToString) -> Self {
        Self::RowNotFound {
            table: table.into(),
            id: id.to_string(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// HTTP status, when the failure came from a response
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_service_error_is_verbatim() {
        let err = BackendError::service("network timeout");
        assert_eq!(err.to_string(), "network timeout");
        assert_eq!(err.http_status(), None);
    }

    #[test]
    fn test_status_error_display() {
        let err = BackendError::status(409, "duplicate key value");
        assert_eq!(err.to_string(), "duplicate key value (HTTP 409)");
        assert_eq!(err.http_status(), Some(409));
    }

    #[test]
    fn test_row_not_found_display() {
        let err = BackendError::row_not_found("places", 12);
        assert!(matches!(err, BackendError::RowNotFound { .. }));
        assert_eq!(err.to_string(), "No row with id 12 in table places");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("[").unwrap_err();
        let err = BackendError::from(json_err);
        assert!(err.to_string().starts_with("JSON error"));
    }
}
