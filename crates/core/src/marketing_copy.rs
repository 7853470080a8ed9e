//! Structured marketing copy attached to generated images.
//!
//! Copy is persisted as a serialized JSON string on the image record.
//! Because records may be touched by other actors, reading it back is
//! fallible: callers get a typed [`CopyParseError`] instead of a panic or
//! a silently-empty bundle.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum accepted length of a serialized copy bundle, in bytes.
pub const MAX_COPY_BYTES: usize = 16 * 1024;

/// Text bundle accompanying one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketingCopy {
    pub headline: String,
    pub body: String,
    pub call_to_action: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

/// Why a stored copy bundle could not be used.
#[derive(Debug, thiserror::Error)]
pub enum CopyParseError {
    #[error("copy is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("copy exceeds {MAX_COPY_BYTES} bytes")]
    TooLarge,

    #[error("copy headline is empty")]
    EmptyHeadline,
}

impl MarketingCopy {
    /// Parse a stored copy bundle.
    pub fn parse(raw: &str) -> Result<Self, CopyParseError> {
        if raw.len() > MAX_COPY_BYTES {
            return Err(CopyParseError::TooLarge);
        }
        let copy: Self = serde_json::from_str(raw)?;
        if copy.headline.trim().is_empty() {
            return Err(CopyParseError::EmptyHeadline);
        }
        Ok(copy)
    }

    /// Serialize for storage on a generated image record.
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string(self)
            .map_err(|e| CoreError::Internal(format!("Failed to serialize marketing copy: {e}")))
    }
}
