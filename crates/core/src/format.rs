//! Marketing image format catalogue.
//!
//! Every format tag maps to fixed target pixel dimensions and a framing
//! phrase used by the prompt renderer. Dimensions are multiples of 64 so
//! they are accepted as-is by diffusion backends.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A supported output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// 1:1 feed post.
    Square,
    /// 4:5 portrait feed post.
    Portrait,
    /// 9:16 story / reel cover.
    Story,
    /// 16:9 landscape ad.
    Landscape,
    /// 3:1 web banner.
    Banner,
}

/// All known formats, in catalogue order.
pub const ALL_FORMATS: &[ImageFormat] = &[
    ImageFormat::Square,
    ImageFormat::Portrait,
    ImageFormat::Story,
    ImageFormat::Landscape,
    ImageFormat::Banner,
];

impl ImageFormat {
    /// Parse a format tag (case-insensitive, surrounding whitespace ignored).
    pub fn from_tag(tag: &str) -> Result<Self, CoreError> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "square" => Ok(Self::Square),
            "portrait" => Ok(Self::Portrait),
            "story" => Ok(Self::Story),
            "landscape" => Ok(Self::Landscape),
            "banner" => Ok(Self::Banner),
            other => Err(CoreError::Validation(format!(
                "Unknown image format '{other}'. Must be one of: {}",
                ALL_FORMATS
                    .iter()
                    .map(|f| f.tag())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Canonical tag, as stored on generated image records.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Square => "square",
            Self::Portrait => "portrait",
            Self::Story => "story",
            Self::Landscape => "landscape",
            Self::Banner => "banner",
        }
    }

    /// Target `(width, height)` in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Square => (1024, 1024),
            Self::Portrait => (896, 1152),
            Self::Story => (768, 1344),
            Self::Landscape => (1344, 768),
            Self::Banner => (1536, 512),
        }
    }

    /// Composition hint appended to prompts rendered for this format.
    pub fn framing(self) -> &'static str {
        match self {
            Self::Square => "centered square composition for a social feed post",
            Self::Portrait => "vertical portrait framing with the product in the upper two thirds",
            Self::Story => "tall full-screen story framing with generous headroom for captions",
            Self::Landscape => "wide cinematic landscape framing with the product off-center",
            Self::Banner => "ultra-wide banner layout with clear negative space on one side",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
