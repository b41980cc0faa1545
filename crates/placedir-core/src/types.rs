//! Core data types for the places directory admin

use crate::config::CreationFlags;
use crate::utils::{content_type_for, human_join, parse_rating};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};

/// Opaque record identifier assigned by the data store
///
/// Stores hand out either integer or UUID keys, so both JSON numbers and
/// strings are accepted and kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create an identifier from its textual form
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Textual form of the identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(id) => Self::from(id),
            RawId::Text(id) => Self(id),
        })
    }
}

/// Boolean columns an operator may flip from the list view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleField {
    /// Visible to the public directory
    Approved,
    /// Highlighted in the public directory
    Featured,
}

impl ToggleField {
    /// Column name in the data store
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Featured => "featured",
        }
    }

    /// Button label for flipping the field from its current value
    #[must_use]
    pub const fn action_label(self, current: bool) -> &'static str {
        match (self, current) {
            (Self::Approved, false) => "Approve",
            (Self::Approved, true) => "Unapprove",
            (Self::Featured, false) => "Feature",
            (Self::Featured, true) => "Unfeature",
        }
    }
}

impl fmt::Display for ToggleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for ToggleField {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approved" => Ok(Self::Approved),
            "featured" => Ok(Self::Featured),
            other => Err(crate::Error::Validation {
                field: "field".to_string(),
                message: format!("'{other}' cannot be toggled"),
            }),
        }
    }
}

/// A persisted places/locations entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned identifier
    pub id: RecordId,

    /// Display name
    pub name: String,

    /// Category label
    #[serde(default)]
    pub category: Option<String>,

    /// English description
    #[serde(default)]
    pub description: Option<String>,

    /// Spanish description
    #[serde(default)]
    pub description_es: Option<String>,

    /// Free-text `[latitude, longitude]` pair
    #[serde(default)]
    pub coordinates: Option<String>,

    /// Geographic region label
    #[serde(default)]
    pub state: Option<String>,

    /// Rating, absent means 0
    #[serde(default)]
    pub rating: Option<f64>,

    /// Public URL of the uploaded image
    #[serde(default)]
    pub image_url: Option<String>,

    /// Operator approval flag
    #[serde(default)]
    pub approved: bool,

    /// Operator feature flag
    #[serde(default)]
    pub featured: bool,

    /// Moderation status, only set by some creation flows
    #[serde(default)]
    pub status: Option<String>,

    /// Store-assigned creation time, the listing sort key
    pub created_at: DateTime<Utc>,
}

impl Record {
    /// Current value of an operator-toggled flag
    #[must_use]
    pub const fn flag(&self, field: ToggleField) -> bool {
        match field {
            ToggleField::Approved => self.approved,
            ToggleField::Featured => self.featured,
        }
    }

    /// Rating with the absent case resolved
    #[must_use]
    pub fn rating_or_default(&self) -> f64 {
        self.rating.unwrap_or_default()
    }

    /// Whether an image has been attached
    #[must_use]
    pub fn has_image(&self) -> bool {
        self.image_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

/// Editable text fields of a [`Draft`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftField {
    /// Display name
    Name,
    /// Category label
    Category,
    /// English description
    Description,
    /// Spanish description
    DescriptionEs,
    /// Coordinates text
    Coordinates,
    /// Region label
    State,
    /// Raw rating text
    Rating,
}

impl DraftField {
    /// Every editable field in form order
    pub const ALL: [Self; 7] = [
        Self::Name,
        Self::Category,
        Self::Description,
        Self::DescriptionEs,
        Self::Coordinates,
        Self::State,
        Self::Rating,
    ];

    /// Field key as used in payloads and configuration
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Category => "category",
            Self::Description => "description",
            Self::DescriptionEs => "description_es",
            Self::Coordinates => "coordinates",
            Self::State => "state",
            Self::Rating => "rating",
        }
    }

    /// Label shown to the operator
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Category => "category",
            Self::Description => "description",
            Self::DescriptionEs => "Spanish description",
            Self::Coordinates => "coordinates",
            Self::State => "state",
            Self::Rating => "rating",
        }
    }
}

impl fmt::Display for DraftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DraftField {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == key)
            .ok_or_else(|| crate::Error::Validation {
                field: s.to_string(),
                message: "unknown form field".to_string(),
            })
    }
}

/// Client-side form state for a record that has not been persisted yet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    /// Display name
    pub name: String,
    /// Category label
    pub category: String,
    /// English description
    pub description: String,
    /// Spanish description
    pub description_es: String,
    /// Coordinates text
    pub coordinates: String,
    /// Region label
    pub state: String,
    /// Raw rating text, coerced at submit time
    pub rating: String,
    /// Approval checkbox
    pub approved: bool,
    /// Feature checkbox
    pub featured: bool,
}

impl Draft {
    /// Set one text field
    pub fn set(&mut self, field: DraftField, value: impl Into<String>) {
        *self.slot(field) = value.into();
    }

    /// Read one text field
    #[must_use]
    pub fn get(&self, field: DraftField) -> &str {
        match field {
            DraftField::Name => &self.name,
            DraftField::Category => &self.category,
            DraftField::Description => &self.description,
            DraftField::DescriptionEs => &self.description_es,
            DraftField::Coordinates => &self.coordinates,
            DraftField::State => &self.state,
            DraftField::Rating => &self.rating,
        }
    }

    /// Set one checkbox
    pub const fn set_flag(&mut self, field: ToggleField, value: bool) {
        match field {
            ToggleField::Approved => self.approved = value,
            ToggleField::Featured => self.featured = value,
        }
    }

    /// Required fields that are still blank, in form order
    #[must_use]
    pub fn missing(&self, required: &[DraftField]) -> Vec<DraftField> {
        DraftField::ALL
            .into_iter()
            .filter(|field| required.contains(field) && self.get(*field).trim().is_empty())
            .collect()
    }

    /// Check required fields without touching any backend
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] naming every blank required field.
    pub fn validate(&self, required: &[DraftField]) -> crate::Result<()> {
        let missing = self.missing(required);
        if missing.is_empty() {
            return Ok(());
        }

        let labels: Vec<&str> = missing.iter().map(|field| field.label()).collect();
        let verb = if missing.len() == 1 { "is" } else { "are" };
        let mut message = format!("{} {verb} required.", human_join(&labels));
        if let Some(first) = message.get_mut(0..1) {
            first.make_ascii_uppercase();
        }

        Err(crate::Error::Validation {
            field: missing
                .iter()
                .map(|field| field.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            message,
        })
    }

    fn slot(&mut self, field: DraftField) -> &mut String {
        match field {
            DraftField::Name => &mut self.name,
            DraftField::Category => &mut self.category,
            DraftField::Description => &mut self.description,
            DraftField::DescriptionEs => &mut self.description_es,
            DraftField::Coordinates => &mut self.coordinates,
            DraftField::State => &mut self.state,
            DraftField::Rating => &mut self.rating,
        }
    }
}

/// Binary file selected for upload alongside a draft
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename as picked by the operator
    pub filename: String,
    /// MIME type sent with the upload
    pub content_type: String,
    /// File contents
    pub bytes: Bytes,
}

impl Attachment {
    /// Create an attachment, inferring the content type from the filename
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let filename = filename.into();
        let content_type = content_type_for(&filename).to_string();
        Self {
            filename,
            content_type,
            bytes: bytes.into(),
        }
    }

    /// Size of the payload in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Insert payload built from a [`Draft`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    /// Display name
    pub name: String,

    /// Category label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// English description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Spanish description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_es: Option<String>,

    /// Coordinates text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<String>,

    /// Region label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Coerced rating
    pub rating: f64,

    /// Public image URL, empty when nothing was uploaded
    pub image_url: String,

    /// Approval flag at creation
    pub approved: bool,

    /// Feature flag at creation
    pub featured: bool,

    /// Initial moderation status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl NewRecord {
    /// Build the insert payload for a validated draft
    #[must_use]
    pub fn from_draft(
        draft: &Draft,
        image_url: impl Into<String>,
        flags: CreationFlags,
        status: Option<&str>,
    ) -> Self {
        let (approved, featured) = match flags {
            CreationFlags::ForceFalse => (false, false),
            CreationFlags::FromDraft => (draft.approved, draft.featured),
        };

        Self {
            name: draft.name.trim().to_string(),
            category: non_blank(&draft.category),
            description: non_blank(&draft.description),
            description_es: non_blank(&draft.description_es),
            coordinates: non_blank(&draft.coordinates),
            state: non_blank(&draft.state),
            rating: parse_rating(&draft.rating),
            image_url: image_url.into(),
            approved,
            featured,
            status: status.map(str::to_string),
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Sort direction for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first
    Asc,
    /// Largest first
    #[default]
    Desc,
}

impl SortDirection {
    /// Query keyword for the direction
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Listing order for a select
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Column to sort on
    pub column: String,
    /// Sort direction
    pub direction: SortDirection,
}

impl OrderBy {
    /// Newest records first
    #[must_use]
    pub fn newest_first() -> Self {
        Self {
            column: "created_at".to_string(),
            direction: SortDirection::Desc,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn beach_draft() -> Draft {
        let mut draft = Draft::default();
        draft.set(DraftField::Name, "Playa Sol");
        draft.set(DraftField::Coordinates, "[24.1,-110.3]");
        draft.set(DraftField::Description, "nice beach");
        draft
    }

    #[test]
    fn test_record_id_accepts_numbers_and_strings() {
        let numeric: RecordId = serde_json::from_value(json!(42)).unwrap();
        let text: RecordId =
            serde_json::from_value(json!("3f0c8a6e-1b7d-4c1e-9d52-0f6a2f1e9b11")).unwrap();

        assert_eq!(numeric.as_str(), "42");
        assert_eq!(text.to_string(), "3f0c8a6e-1b7d-4c1e-9d52-0f6a2f1e9b11");
        assert_eq!(serde_json::to_value(&numeric).unwrap(), json!("42"));
    }

    #[test]
    fn test_record_deserializes_store_row() {
        let row = json!({
            "id": 7,
            "name": "Cabo Pulmo",
            "category": "reef",
            "coordinates": "[23.4,-109.4]",
            "approved": true,
            "created_at": "2024-05-01T12:30:00.123456+00:00",
            "added_by": null
        });

        let record: Record = serde_json::from_value(row).unwrap();

        assert_eq!(record.id, RecordId::from(7));
        assert_eq!(record.category.as_deref(), Some("reef"));
        assert!(record.approved);
        assert!(!record.featured);
        assert_eq!(record.rating_or_default(), 0.0);
        assert!(!record.has_image());
        assert!(record.flag(ToggleField::Approved));
        assert!(!record.flag(ToggleField::Featured));
    }

    #[test]
    fn test_toggle_field_parsing_and_labels() {
        assert_eq!("Approved".parse::<ToggleField>().unwrap(), ToggleField::Approved);
        assert_eq!(" featured ".parse::<ToggleField>().unwrap(), ToggleField::Featured);
        assert!("name".parse::<ToggleField>().is_err());

        assert_eq!(ToggleField::Approved.action_label(false), "Approve");
        assert_eq!(ToggleField::Approved.action_label(true), "Unapprove");
        assert_eq!(ToggleField::Featured.action_label(false), "Feature");
        assert_eq!(ToggleField::Featured.action_label(true), "Unfeature");
    }

    #[test]
    fn test_draft_field_parsing() {
        assert_eq!("description-es".parse::<DraftField>().unwrap(), DraftField::DescriptionEs);
        assert_eq!("NAME".parse::<DraftField>().unwrap(), DraftField::Name);
        assert!("image".parse::<DraftField>().unwrap_err().is_validation());
    }

    #[test]
    fn test_draft_set_and_get() {
        let mut draft = Draft::default();
        for field in DraftField::ALL {
            draft.set(field, field.as_str());
        }
        for field in DraftField::ALL {
            assert_eq!(draft.get(field), field.as_str());
        }

        draft.set_flag(ToggleField::Featured, true);
        assert!(draft.featured);
        assert!(!draft.approved);
    }

    #[test]
    fn test_validate_reports_all_missing_fields() {
        let draft = Draft {
            description: "nice".to_string(),
            ..Draft::default()
        };

        let err = draft
            .validate(&[DraftField::Name, DraftField::Description, DraftField::Coordinates])
            .unwrap_err();

        match err {
            crate::Error::Validation { field, message } => {
                assert_eq!(field, "name, coordinates");
                assert_eq!(message, "Name and coordinates are required.");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_validate_treats_whitespace_as_blank() {
        let mut draft = beach_draft();
        draft.set(DraftField::Name, "   ");

        let err = draft.validate(&[DraftField::Name]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: name - Name is required."
        );
    }

    #[test]
    fn test_new_record_matches_expected_payload() {
        let payload = NewRecord::from_draft(&beach_draft(), "", CreationFlags::ForceFalse, None);

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "name": "Playa Sol",
                "coordinates": "[24.1,-110.3]",
                "description": "nice beach",
                "rating": 0.0,
                "image_url": "",
                "approved": false,
                "featured": false
            })
        );
    }

    #[test]
    fn test_new_record_creation_flags() {
        let mut draft = beach_draft();
        draft.set_flag(ToggleField::Approved, true);
        draft.set_flag(ToggleField::Featured, true);
        draft.set(DraftField::Rating, "4.5");

        let forced = NewRecord::from_draft(&draft, "", CreationFlags::ForceFalse, None);
        assert!(!forced.approved);
        assert!(!forced.featured);

        let honoured =
            NewRecord::from_draft(&draft, "https://cdn/x.jpg", CreationFlags::FromDraft, Some("pending"));
        assert!(honoured.approved);
        assert!(honoured.featured);
        assert_eq!(honoured.rating, 4.5);
        assert_eq!(honoured.image_url, "https://cdn/x.jpg");
        assert_eq!(honoured.status.as_deref(), Some("pending"));
    }

    #[test]
    fn test_attachment_infers_content_type() {
        let attachment = Attachment::new("Beach.JPG", vec![1_u8, 2, 3]);

        assert_eq!(attachment.content_type, "image/jpeg");
        assert_eq!(attachment.len(), 3);
        assert!(!attachment.is_empty());
        assert!(format!("{attachment:?}").contains("len: 3"));
    }

    #[test]
    fn test_order_by_newest_first() {
        let order = OrderBy::newest_first();
        assert_eq!(order.column, "created_at");
        assert_eq!(order.direction.as_str(), "desc");
    }
}
