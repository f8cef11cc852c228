use std::path::Path;

use mime::Mime;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::session::{UploadFailure, UploadResult};

const COVER_PREFIX: &str = "covers";

/// Location of an uploaded cover image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverUpload {
    /// Object key in the bucket
    pub key: String,
    /// Public URL stored in the book's `cover` field
    pub url: String,
}

/// File extension for an accepted cover image content type
#[must_use]
pub fn cover_extension(content_type: &str) -> Option<&'static str> {
    let parsed: Mime = content_type.trim().to_ascii_lowercase().parse().ok()?;
    if parsed.type_() != mime::IMAGE {
        return None;
    }

    match parsed.subtype().as_str() {
        "jpeg" | "jpg" | "pjpeg" => Some("jpg"),
        "png" => Some("png"),
        "gif" => Some("gif"),
        "webp" => Some("webp"),
        _ => None,
    }
}

/// Content type of a cover image file, judged by its extension
#[must_use]
pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Maps a SHA-256 hex digest to a fanned-out cover key
///
/// # Panics
///
/// Panics if `sha256` is shorter than 4 ASCII characters
fn map_sha256_to_cover_key(sha256: &str, extension: &str) -> String {
    let ab = &sha256[0..2];
    let cd = &sha256[2..4];
    format!("{COVER_PREFIX}/{ab}/{cd}/{sha256}.{extension}")
}

/// Content-addressed key of a cover image: identical images share one object
///
/// # Errors
///
/// Returns `UploadFailure::EmptyBody` for an empty body
/// Returns `UploadFailure::UnsupportedContentType` for anything but JPEG, PNG, GIF or WebP
pub fn cover_object_key(body: &[u8], content_type: &str) -> UploadResult<String> {
    if body.is_empty() {
        return Err(UploadFailure::EmptyBody);
    }

    let extension = cover_extension(content_type)
        .ok_or_else(|| UploadFailure::UnsupportedContentType(content_type.to_string()))?;
    let digest = hex::encode(Sha256::digest(body));

    Ok(map_sha256_to_cover_key(&digest, extension))
}
