//! Blob storage key derivation, key validation, and content-type sniffing.
//!
//! Image keys embed the campaign, format, wall-clock time, and a random
//! suffix so that jobs succeeding concurrently never collide.

use rand::Rng;

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const CONTENT_TYPE_PNG: &str = "image/png";
pub const CONTENT_TYPE_JPEG: &str = "image/jpeg";
pub const CONTENT_TYPE_WEBP: &str = "image/webp";
pub const CONTENT_TYPE_ZIP: &str = "application/zip";

/// Length of the random alphanumeric suffix on image keys.
const KEY_SUFFIX_LENGTH: usize = 8;

/// Maximum storage key length.
const MAX_KEY_LENGTH: usize = 512;

// ---------------------------------------------------------------------------
// Content type
// ---------------------------------------------------------------------------

/// Sniff the image content type from magic bytes, defaulting to PNG.
pub fn detect_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        CONTENT_TYPE_JPEG
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        CONTENT_TYPE_WEBP
    } else {
        CONTENT_TYPE_PNG
    }
}

/// File extension (without dot) for a content type.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        CONTENT_TYPE_JPEG => "jpg",
        CONTENT_TYPE_WEBP => "webp",
        CONTENT_TYPE_ZIP => "zip",
        _ => "png",
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

fn random_suffix() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(KEY_SUFFIX_LENGTH)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Key for one generated image:
/// `campaigns/{campaign_id}/{format}/{unix_millis}-{suffix}.{ext}`.
pub fn image_storage_key(
    campaign_id: DbId,
    format: &str,
    now: Timestamp,
    content_type: &str,
) -> String {
    format!(
        "campaigns/{campaign_id}/{format}/{}-{}.{}",
        now.timestamp_millis(),
        random_suffix(),
        extension_for(content_type),
    )
}

/// Key for a packaged archive: `archives/{campaign_id}/{yyyymmddThhmmssZ}.zip`.
pub fn archive_storage_key(campaign_id: DbId, now: Timestamp) -> String {
    format!(
        "archives/{campaign_id}/{}.zip",
        now.format("%Y%m%dT%H%M%SZ")
    )
}

/// Validate that a key is a safe relative path.
///
/// Rejects empty keys, absolute paths, backslashes, `..` / `.` segments,
/// empty segments, and keys longer than 512 bytes.
pub fn validate_storage_key(key: &str) -> Result<(), CoreError> {
    if key.is_empty() {
        return Err(CoreError::Validation("Storage key must not be empty".into()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CoreError::Validation(format!(
            "Storage key exceeds {MAX_KEY_LENGTH} bytes"
        )));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(CoreError::Validation(format!(
            "Storage key '{key}' must be a relative forward-slash path"
        )));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(CoreError::Validation(format!(
            "Storage key '{key}' contains an empty or relative segment"
        )));
    }
    Ok(())
}
