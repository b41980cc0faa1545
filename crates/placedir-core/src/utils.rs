//! Utility functions for the places directory admin

use crate::config::StorageKeyStyle;
use std::path::Path;

/// Build the object key for an uploaded image
///
/// The millisecond timestamp keeps keys from colliding while the namespace
/// and filename keep them traceable to the page that uploaded them.
#[must_use]
pub fn storage_key(
    namespace: &str,
    filename: &str,
    epoch_millis: i64,
    style: StorageKeyStyle,
) -> String {
    let object = match style {
        StorageKeyStyle::TimestampedName => {
            format!("{epoch_millis}-{}", sanitize_filename(filename))
        }
        StorageKeyStyle::TimestampedExtension => match file_extension(filename) {
            Some(ext) => format!("{epoch_millis}.{ext}"),
            None => epoch_millis.to_string(),
        },
    };

    let namespace = namespace.trim_matches('/');
    if namespace.is_empty() {
        object
    } else {
        format!("{namespace}/{object}")
    }
}

/// Lower-cased extension of a filename, if it has one
#[must_use]
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Sanitize filename for safe storage
#[must_use]
pub fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(filename);

    let cleaned = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string();

    // A stem made only of non-ASCII characters is stripped down to its extension.
    if cleaned.chars().all(|c| c == '.') {
        "upload".to_string()
    } else if cleaned.starts_with('.') {
        format!("upload{cleaned}")
    } else {
        cleaned
    }
}

/// MIME type for an image filename
#[must_use]
pub fn content_type_for(filename: &str) -> &'static str {
    match file_extension(filename).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("svg") => "image/svg+xml",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}

/// Coerce raw rating text, falling back to 0 on blank or invalid input
#[must_use]
pub fn parse_rating(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|rating| rating.is_finite())
        .unwrap_or(0.0)
}

/// Join labels as `a`, `a and b`, or `a, b, and c`
#[must_use]
pub fn human_join(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [only] => (*only).to_string(),
        [first, second] => format!("{first} and {second}"),
        [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
    }
}
