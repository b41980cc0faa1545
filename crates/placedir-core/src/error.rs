//! Error types for the places directory admin

use std::{error::Error as StdError, fmt};

/// Main error type for the places directory admin
#[derive(Debug)]
pub enum Error {
    /// Draft failed a client-side check; no backend was contacted
    Validation {
        /// Field or fields that failed validation
        field: String,
        /// Validation error message
        message: String,
    },

    /// Attachment upload was rejected by object storage
    Upload(String),

    /// Record insert was rejected by the data store
    Persist(String),

    /// Listing records failed
    Fetch(String),

    /// Single-field update failed
    Update(String),

    /// Not found error
    NotFound {
        /// Resource that was not found
        resource: String,
    },

    /// A submission of the same draft is already running
    SubmissionInFlight,

    /// Another operation on the same resource is already running
    OperationInFlight {
        /// Resource that is busy
        resource: String,
    },

    /// Configuration error
    Configuration {
        /// Error message
        message: String,
    },

    /// I/O error
    Io(std::io::Error),

    /// Serialization error
    Serialization(serde_json::Error),

}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the operator can recover by editing the draft alone
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Whether the error was reported by a backend collaborator
    #[must_use]
    pub const fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::Upload(_) | Self::Persist(_) | Self::Fetch(_) | Self::Update(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { field, message } => {
                write!(f, "Validation error: {field} - {message}")
            }
            Self::Upload(msg) => write!(f, "Image upload failed: {msg}"),
            Self::Persist(msg) => write!(f, "Insert failed: {msg}"),
            Self::Fetch(msg) => write!(f, "Fetching records failed: {msg}"),
            Self::Update(msg) => write!(f, "Update failed: {msg}"),
            Self::NotFound { resource } => write!(f, "Resource not found: {resource}"),
            Self::SubmissionInFlight => write!(f, "A submission is already in progress"),
            Self::OperationInFlight { resource } => {
                write!(f, "An operation on {resource} is already in progress")
            }
            Self::Configuration { message } => write!(f, "Configuration error: {message}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Serialization(err) => write!(f, "Serialization error: {err}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}
