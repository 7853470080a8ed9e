//! Archive manifest structure and archive entry naming.
//!
//! Archive layout:
//! ```text
//! manifest.json
//! images/
//!   01_square_41.png
//!   02_story_42.jpg
//!   ...
//! copy/
//!   41.json          (only for images with valid marketing copy)
//! ```

use serde::Serialize;

use crate::campaign::{Preferences, ProductFacts};
use crate::error::CoreError;
use crate::storage::extension_for;
use crate::types::{DbId, Timestamp};

/// Name of the manifest entry at the archive root.
pub const MANIFEST_ENTRY_NAME: &str = "manifest.json";

/// Caller-supplied product and preference context for a manifest.
#[derive(Debug, Clone)]
pub struct ManifestInfo {
    pub product: ProductFacts,
    pub preferences: Preferences,
}

/// One image included in the archive.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestImage {
    pub image_id: DbId,
    /// Entry path inside the archive.
    pub file_name: String,
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub prompt: String,
    pub sha256: String,
    pub has_copy: bool,
}

/// Metadata summary embedded in every archive.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveManifest {
    pub campaign_id: DbId,
    pub product: ProductFacts,
    pub preferences: Preferences,
    pub generated_at: Timestamp,
    /// Distinct formats of the included images, in first-seen order.
    pub formats: Vec<String>,
    pub images: Vec<ManifestImage>,
    /// Images included without copy because their stored copy was unusable.
    pub copy_omitted: Vec<DbId>,
    /// Selected images whose bytes could not be fetched.
    pub missing_images: Vec<DbId>,
}

impl ArchiveManifest {
    pub fn new(campaign_id: DbId, info: &ManifestInfo, generated_at: Timestamp) -> Self {
        Self {
            campaign_id,
            product: info.product.clone(),
            preferences: info.preferences.clone(),
            generated_at,
            formats: Vec::new(),
            images: Vec::new(),
            copy_omitted: Vec::new(),
            missing_images: Vec::new(),
        }
    }

    /// Record an included image, tracking its format.
    pub fn push_image(&mut self, image: ManifestImage) {
        if !self.formats.contains(&image.format) {
            self.formats.push(image.format.clone());
        }
        self.images.push(image);
    }

    /// Number of copy fragments the archive carries.
    pub fn copy_count(&self) -> usize {
        self.images.iter().filter(|i| i.has_copy).count()
    }

    /// Check the manifest is well-formed.
    ///
    /// Returns an empty `Vec` if valid; otherwise human-readable errors.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.images.is_empty() {
            errors.push("Manifest must include at least one image".to_string());
        }
        if self.product.name.trim().is_empty() {
            errors.push("Product name must not be empty".to_string());
        }
        for image in &self.images {
            if image.file_name.is_empty() {
                errors.push(format!("Image {} has an empty file name", image.image_id));
            }
            if image.has_copy && self.copy_omitted.contains(&image.image_id) {
                errors.push(format!(
                    "Image {} is marked both with and without copy",
                    image.image_id
                ));
            }
        }
        let mut names: Vec<&str> = self.images.iter().map(|i| i.file_name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            errors.push("Image file names must be unique".to_string());
        }

        errors
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| CoreError::Internal(format!("Failed to serialize manifest: {e}")))
    }
}

/// Archive path for an image: `images/{nn}_{format}_{image_id}.{ext}`.
///
/// `position` is 1-based.
pub fn image_entry_name(position: usize, format: &str, image_id: DbId, content_type: &str) -> String {
    format!(
        "images/{position:02}_{format}_{image_id}.{}",
        extension_for(content_type)
    )
}

/// Archive path for an image's copy fragment.
pub fn copy_entry_name(image_id: DbId) -> String {
    format!("copy/{image_id}.json")
}
