//! Campaign, product, preference, and generated-image domain types.
//!
//! These are the storage-agnostic shapes exchanged with the
//! [`RecordStore`](crate::services::RecordStore) collaborator. Row-level
//! representations live in `adgen-db`.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Campaign status
// ---------------------------------------------------------------------------

/// Campaign lifecycle status.
///
/// `Generating -> {Completed, Failed}` is owned by the orchestrator. The
/// archive builder only attaches download fields to a `Completed` campaign
/// with no active run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Generating,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "generating" => Ok(Self::Generating),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown campaign status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Read-only product description supplied by the external lookup step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductFacts {
    pub product_id: String,
    pub name: String,
    pub category: String,
    /// Short benefit phrases, most important first.
    #[serde(default)]
    pub benefits: Vec<String>,
}

/// How much on-image text the generated visuals should leave room for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOverlay {
    None,
    #[default]
    Minimal,
    Moderate,
    Heavy,
}

/// Style, format, and size choices for one campaign.
///
/// A copy is snapshotted onto the campaign when a run starts and never
/// re-read live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Total number of images requested.
    pub image_count: i32,
    /// Format tags, in priority order.
    pub formats: Vec<String>,
    #[serde(default)]
    pub brand_style: Option<String>,
    #[serde(default)]
    pub color_mood: Option<String>,
    #[serde(default)]
    pub lighting: Option<String>,
    #[serde(default)]
    pub composition: Option<String>,
    #[serde(default)]
    pub scene_type: Option<String>,
    #[serde(default)]
    pub time_of_day: Option<String>,
    #[serde(default)]
    pub text_overlay: TextOverlay,
}

impl Preferences {
    /// Minimal preferences with every style modifier left to defaults.
    pub fn new(image_count: i32, formats: &[&str]) -> Self {
        Self {
            image_count,
            formats: formats.iter().map(|f| f.to_string()).collect(),
            brand_style: None,
            color_mood: None,
            lighting: None,
            composition: None,
            scene_type: None,
            time_of_day: None,
            text_overlay: TextOverlay::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted entities
// ---------------------------------------------------------------------------

/// One generation run for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: DbId,
    pub product_id: String,
    pub preferences: Preferences,
    pub status: CampaignStatus,
    /// A generation run currently holds the single-flight claim.
    pub run_active: bool,
    pub download_url: Option<String>,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// One successfully produced image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImageRecord {
    pub id: DbId,
    pub campaign_id: DbId,
    pub format: String,
    pub prompt_text: String,
    pub width: u32,
    pub height: u32,
    pub storage_key: String,
    pub content_type: String,
    pub selected: bool,
    /// Raw serialized copy bundle. May be absent or malformed when written
    /// by other actors; see [`crate::marketing_copy::MarketingCopy::parse`].
    pub marketing_copy: Option<String>,
    pub created_at: Timestamp,
}

/// Insert DTO for a generated image. Records are always created selected.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGeneratedImage {
    pub campaign_id: DbId,
    pub format: String,
    pub prompt_text: String,
    pub width: u32,
    pub height: u32,
    pub storage_key: String,
    pub content_type: String,
    pub marketing_copy: Option<String>,
}

/// Keep only images currently marked selected, preserving order.
pub fn selected_images(images: Vec<GeneratedImageRecord>) -> Vec<GeneratedImageRecord> {
    images.into_iter().filter(|i| i.selected).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names_round_trip() {
        for status in [
            CampaignStatus::Generating,
            CampaignStatus::Completed,
            CampaignStatus::Failed,
        ] {
            assert_eq!(CampaignStatus::from_name(status.as_str()).unwrap(), status);
        }
        assert!(CampaignStatus::from_name("archived").is_err());
    }

    #[test]
    fn preferences_deserialize_with_defaults() {
        let prefs: Preferences =
            serde_json::from_str(r#"{"image_count": 4, "formats": ["square"]}"#).unwrap();
        assert_eq!(prefs.image_count, 4);
        assert_eq!(prefs.text_overlay, TextOverlay::Minimal);
        assert!(prefs.brand_style.is_none());
    }

    #[test]
    fn selected_images_filters_deselected() {
        let make = |id, selected| GeneratedImageRecord {
            id,
            campaign_id: 1,
            format: "square".into(),
            prompt_text: "p".into(),
            width: 1024,
            height: 1024,
            storage_key: format!("k/{id}"),
            content_type: "image/png".into(),
            selected,
            marketing_copy: None,
            created_at: chrono::Utc::now(),
        };
        let kept = selected_images(vec![make(1, true), make(2, false), make(3, true)]);
        assert_eq!(kept.iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 3]);
    }
}
