//! Core types and utilities for the places directory admin
//!
//! Holds the record/draft data model, the error taxonomy shared by every
//! crate in the workspace, configuration loading and logging set-up.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::{
    BackendConfig, Config, CreationFlags, DirectoryConfig, LoggingConfig, Profile,
    StorageKeyStyle, UrlLookupPolicy,
};
pub use error::{Error, Result};
pub use types::{
    Attachment, Draft, DraftField, NewRecord, OrderBy, Record, RecordId, SortDirection,
    ToggleField,
};

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed.
pub fn init_logging(logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
    };

    installed.map_err(|e| Error::Configuration {
        message: format!("failed to initialise logging: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_only_once() {
        let logging = LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
        };

        // A second global subscriber is refused rather than panicking.
        let _first = init_logging(&logging);
        let second = init_logging(&logging);
        assert!(matches!(second, Err(Error::Configuration { .. })));
    }
}
