//! Configuration management for the places directory admin

use crate::types::DraftField;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Hosted backend connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Which table, bucket and form rules the admin works against
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hosted backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`
    #[validate(url)]
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// API key sent as `apikey` and bearer token
    #[serde(default)]
    pub api_key: String,

    /// Total request timeout in seconds
    #[validate(range(min = 1))]
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connection timeout in seconds
    #[validate(range(min = 1))]
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// How `approved`/`featured` are chosen when a record is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationFlags {
    /// Always insert `false`, ignoring the form's checkboxes
    #[default]
    ForceFalse,
    /// Insert whatever the form's checkboxes say
    FromDraft,
}

/// What to do when the public URL of an uploaded image cannot be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlLookupPolicy {
    /// Persist the record with an empty `image_url`
    #[default]
    UseEmptyString,
    /// Abort the submission with an upload error
    Fail,
}

/// Layout of object keys for uploaded images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKeyStyle {
    /// `{namespace}/{epoch_millis}-{filename}`
    #[default]
    TimestampedName,
    /// `{namespace}/{epoch_millis}.{extension}`
    TimestampedExtension,
}

/// Preset matching one of the admin pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// Places admin page: table `places`, flags forced false
    Places,
    /// Stand-alone add-location form: description required, checkboxes honoured
    PlacesStrict,
    /// Legacy admin page backed by the `locations` table
    Locations,
}

impl Profile {
    /// Directory settings for this preset
    #[must_use]
    pub fn directory(self) -> DirectoryConfig {
        match self {
            Self::Places => DirectoryConfig {
                namespace: "locations".to_string(),
                key_style: StorageKeyStyle::TimestampedExtension,
                ..DirectoryConfig::default()
            },
            Self::PlacesStrict => DirectoryConfig {
                namespace: "admin".to_string(),
                required_fields: vec![
                    DraftField::Name,
                    DraftField::Description,
                    DraftField::Coordinates,
                ],
                creation_flags: CreationFlags::FromDraft,
                initial_status: Some("pending".to_string()),
                ..DirectoryConfig::default()
            },
            Self::Locations => DirectoryConfig {
                table: "locations".to_string(),
                ..DirectoryConfig::default()
            },
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "places" => Ok(Self::Places),
            "places-strict" | "strict" => Ok(Self::PlacesStrict),
            "locations" => Ok(Self::Locations),
            other => Err(crate::Error::Configuration {
                message: format!("unknown profile '{other}'"),
            }),
        }
    }
}

/// Table, bucket and form rules for one directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct DirectoryConfig {
    /// Data store table holding the records
    #[validate(length(min = 1))]
    #[serde(default = "default_table")]
    pub table: String,

    /// Object storage bucket for images
    #[validate(length(min = 1))]
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Key prefix inside the bucket
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Fields that must be non-blank before anything is sent
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<DraftField>,

    /// Creation-time handling of `approved`/`featured`
    #[serde(default)]
    pub creation_flags: CreationFlags,

    /// Handling of a missing public URL after upload
    #[serde(default)]
    pub url_lookup: UrlLookupPolicy,

    /// Object key layout
    #[serde(default)]
    pub key_style: StorageKeyStyle,

    /// Status written on creation, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_status: Option<String>,
}

impl DirectoryConfig {
    /// Check that the required-field set keeps the record shape valid
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a field check fails or if `name`
    /// or `coordinates` is not required.
    pub fn check(&self) -> crate::Result<()> {
        self.validate().map_err(|e| crate::Error::Configuration {
            message: e.to_string(),
        })?;

        for field in [DraftField::Name, DraftField::Coordinates] {
            if !self.required_fields.contains(&field) {
                return Err(crate::Error::Configuration {
                    message: format!("required_fields must include '{field}'"),
                });
            }
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json or pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_backend_url() -> String {
    "http://localhost:54321".to_string()
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_connect_timeout() -> u64 {
    5
}

fn default_table() -> String {
    "places".to_string()
}

fn default_bucket() -> String {
    "places-images".to_string()
}

fn default_namespace() -> String {
    "admin".to_string()
}

fn default_required_fields() -> Vec<DraftField> {
    vec![DraftField::Name, DraftField::Coordinates]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            api_key: String::new(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            bucket: default_bucket(),
            namespace: default_namespace(),
            required_fields: default_required_fields(),
            creation_flags: CreationFlags::default(),
            url_lookup: UrlLookupPolicy::default(),
            key_style: StorageKeyStyle::default(),
            initial_status: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Default file looked up in the working directory
    pub const DEFAULT_FILE: &'static str = "placedir";

    /// Environment variable prefix, e.g. `PLACEDIR__BACKEND__URL`
    pub const ENV_PREFIX: &'static str = "PLACEDIR";

    /// Load configuration from `placedir.toml` (if present) and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded, parsed or checked.
    pub fn load() -> crate::Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an explicit file (required) or the default one
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded, parsed or checked.
    pub fn load_from(path: Option<&Path>) -> crate::Result<Self> {
        Self::load_layered(path, None)
    }

    /// Load configuration on top of a directory preset
    ///
    /// The preset only supplies defaults: `[directory]` keys from the file or
    /// the environment still override it.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded, parsed or checked.
    pub fn load_layered(path: Option<&Path>, profile: Option<Profile>) -> crate::Result<Self> {
        let base = profile.map_or_else(Self::default, |profile| {
            Self::default().with_profile(profile)
        });

        let file = path.map_or_else(
            || config::File::with_name(Self::DEFAULT_FILE).required(false),
            |path| config::File::from(PathBuf::from(path)).required(true),
        );

        let config: Self = config::Config::builder()
            .add_source(config::Config::try_from(&base)?)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.check()?;
        Ok(config)
    }

    /// Replace the directory section with a named preset
    #[must_use]
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.directory = profile.directory();
        self
    }

    /// Check every section
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid section.
    pub fn check(&self) -> crate::Result<()> {
        self.backend.validate().map_err(|e| crate::Error::Configuration {
            message: e.to_string(),
        })?;
        self.directory.check()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.backend.url, "http://localhost:54321");
        assert!(config.backend.api_key.is_empty());
        assert_eq!(config.backend.request_timeout_secs, 30);
        assert_eq!(config.backend.connect_timeout_secs, 5);

        assert_eq!(config.directory.table, "places");
        assert_eq!(config.directory.bucket, "places-images");
        assert_eq!(config.directory.namespace, "admin");
        assert_eq!(
            config.directory.required_fields,
            vec![DraftField::Name, DraftField::Coordinates]
        );
        assert_eq!(config.directory.creation_flags, CreationFlags::ForceFalse);
        assert_eq!(config.directory.url_lookup, UrlLookupPolicy::UseEmptyString);
        assert_eq!(config.directory.key_style, StorageKeyStyle::TimestampedName);
        assert!(config.directory.initial_status.is_none());

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");

        assert!(config.check().is_ok());
    }

    #[test]
    fn test_partial_config_deserialization() {
        let json_str = r#"{
            "backend": {"url": "https://demo.supabase.co", "api_key": "anon"},
            "directory": {"table": "locations", "url_lookup": "fail"}
        }"#;

        let config: Config = serde_json::from_str(json_str).unwrap();

        assert_eq!(config.backend.url, "https://demo.supabase.co");
        assert_eq!(config.backend.request_timeout_secs, 30);
        assert_eq!(config.directory.table, "locations");
        assert_eq!(config.directory.bucket, "places-images");
        assert_eq!(config.directory.url_lookup, UrlLookupPolicy::Fail);
        assert_eq!(config.logging.level, "info");
    }

    #[rstest]
    #[case(Profile::Places, "places", "locations", CreationFlags::ForceFalse, None)]
    #[case(Profile::PlacesStrict, "places", "admin", CreationFlags::FromDraft, Some("pending"))]
    #[case(Profile::Locations, "locations", "admin", CreationFlags::ForceFalse, None)]
    fn test_profiles(
        #[case] profile: Profile,
        #[case] table: &str,
        #[case] namespace: &str,
        #[case] flags: CreationFlags,
        #[case] status: Option<&str>,
    ) {
        let directory = profile.directory();

        assert_eq!(directory.table, table);
        assert_eq!(directory.namespace, namespace);
        assert_eq!(directory.creation_flags, flags);
        assert_eq!(directory.initial_status.as_deref(), status);
        assert!(directory.check().is_ok());
    }

    #[test]
    fn test_strict_profile_requires_description() {
        let directory = Profile::PlacesStrict.directory();
        assert!(directory.required_fields.contains(&DraftField::Description));
        assert!(!Profile::Places.directory().required_fields.contains(&DraftField::Description));
    }

    #[rstest]
    #[case("places", Profile::Places)]
    #[case("Places-Strict", Profile::PlacesStrict)]
    #[case("strict", Profile::PlacesStrict)]
    #[case("locations", Profile::Locations)]
    fn test_profile_from_str(#[case] input: &str, #[case] expected: Profile) {
        assert_eq!(input.parse::<Profile>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_profile_rejected() {
        assert!(matches!(
            "archive".parse::<Profile>(),
            Err(crate::Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_required_fields_must_keep_name_and_coordinates() {
        let directory = DirectoryConfig {
            required_fields: vec![DraftField::Name],
            ..DirectoryConfig::default()
        };

        let err = directory.check().unwrap_err();
        assert!(err.to_string().contains("coordinates"));
    }

    #[test]
    fn test_empty_table_rejected() {
        let directory = DirectoryConfig {
            table: String::new(),
            ..DirectoryConfig::default()
        };

        assert!(directory.check().is_err());
    }

    #[test]
    fn test_invalid_backend_url_rejected() {
        let mut config = Config::default();
        config.backend.url = "not a url".to_string();

        assert!(matches!(
            config.check(),
            Err(crate::Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_with_profile_replaces_directory() {
        let config = Config::default().with_profile(Profile::Locations);
        assert_eq!(config.directory.table, "locations");
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[backend]
url = "https://demo.supabase.co"
api_key = "anon-key"

[directory]
table = "places"
namespace = "admin"
required_fields = ["name", "description", "coordinates"]
creation_flags = "from_draft"
key_style = "timestamped_extension"
initial_status = "pending"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();

        assert_eq!(config.backend.api_key, "anon-key");
        assert_eq!(config.directory.required_fields.len(), 3);
        assert_eq!(config.directory.creation_flags, CreationFlags::FromDraft);
        assert_eq!(config.directory.key_style, StorageKeyStyle::TimestampedExtension);
        assert_eq!(config.directory.initial_status.as_deref(), Some("pending"));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_profile_is_overridden_by_file_directory_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[directory]
table = "beach_places"
bucket = "beach-images"
"#
        )
        .unwrap();

        let config = Config::load_layered(Some(file.path()), Some(Profile::PlacesStrict)).unwrap();

        assert_eq!(config.directory.table, "beach_places");
        assert_eq!(config.directory.bucket, "beach-images");
        assert!(config.directory.required_fields.contains(&DraftField::Description));
        assert_eq!(config.directory.creation_flags, CreationFlags::FromDraft);
        assert_eq!(config.directory.initial_status.as_deref(), Some("pending"));
    }

    #[test]
    fn test_load_layered_without_profile_matches_load_from() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[directory]\ntable = \"locations\"").unwrap();

        let layered = Config::load_layered(Some(file.path()), None).unwrap();
        let plain = Config::load_from(Some(file.path())).unwrap();

        assert_eq!(layered.directory, plain.directory);
        assert_eq!(layered.directory.namespace, "admin");
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");

        assert!(Config::load_from(Some(&missing)).is_err());
    }

    #[test]
    fn test_config_serialization_roundtrip_through_toml() {
        let config = Config::default().with_profile(Profile::PlacesStrict);

        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(deserialized.directory, config.directory);
        assert_eq!(deserialized.backend.url, config.backend.url);
    }
}
