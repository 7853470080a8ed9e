//! Deterministic prompt and copy rendering for planned jobs.
//!
//! Rendering is a pure function of the product facts, the preference
//! snapshot, the target format, and the job's position. Identical inputs
//! always produce identical text, while neighbouring jobs differ through a
//! rotating camera angle, benefit emphasis, and variation counter.

use std::sync::LazyLock;

use regex::Regex;

use crate::campaign::{Preferences, ProductFacts, TextOverlay};
use crate::format::ImageFormat;
use crate::marketing_copy::MarketingCopy;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Camera angles cycled by global job index.
const CAMERA_ANGLES: &[&str] = &[
    "eye-level hero shot",
    "slightly elevated three-quarter angle",
    "close-up detail shot",
    "low-angle heroic perspective",
    "overhead flat-lay perspective",
    "lifestyle in-use shot",
];

/// Calls to action cycled by global job index.
const CALLS_TO_ACTION: &[&str] = &["Shop now", "Discover more", "Get yours today", "Learn more"];

const DEFAULT_BRAND_STYLE: &str = "clean modern";
const DEFAULT_COLOR_MOOD: &str = "natural balanced";
const DEFAULT_LIGHTING: &str = "soft diffused studio";
const DEFAULT_COMPOSITION: &str = "rule-of-thirds composition";
const DEFAULT_SCENE: &str = "a minimal studio backdrop";
const DEFAULT_TIME_OF_DAY: &str = "daytime";

/// Collapses runs of whitespace left behind by empty fragments.
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Characters dropped when turning free text into a hashtag.
static NON_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid regex"));

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Where a job sits within the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPosition {
    /// Index across the whole plan (0-based).
    pub global_index: usize,
    /// Index among jobs of the same format (0-based).
    pub format_index: usize,
    /// Number of jobs allocated to the same format.
    pub format_total: usize,
}

// ---------------------------------------------------------------------------
// Compliance
// ---------------------------------------------------------------------------

/// Category-appropriate compliance phrase appended to every prompt.
pub fn compliance_phrase(category: &str) -> &'static str {
    let category = category.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| category.contains(n));

    if has(&["supplement", "vitamin", "health", "pharma"]) {
        "no medical or health claims, no before-and-after imagery"
    } else if has(&["beauty", "cosmetic", "skincare", "skin care"]) {
        "no exaggerated skin retouching, no before-and-after comparisons"
    } else if has(&["alcohol", "wine", "beer", "spirits"]) {
        "adults only, no depiction of excessive consumption"
    } else if has(&["food", "beverage", "drink", "snack"]) {
        "food shown as served, no misleading portion sizes"
    } else if has(&["toy", "kids", "baby", "children"]) {
        "child-safe setting, no small detachable parts within reach"
    } else {
        "truthful depiction of the product, no misleading claims"
    }
}

fn overlay_phrase(overlay: TextOverlay) -> &'static str {
    match overlay {
        TextOverlay::None => "no text, no lettering, no logos",
        TextOverlay::Minimal => "leave a small clean area for a short headline",
        TextOverlay::Moderate => "reserve a clear band for a headline and subline",
        TextOverlay::Heavy => "large uncluttered background area for prominent promotional text",
    }
}

fn or_default<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

fn benefit_at<'a>(facts: &'a ProductFacts, index: usize) -> Option<&'a str> {
    let benefits: Vec<&str> = facts
        .benefits
        .iter()
        .map(|b| b.trim())
        .filter(|b| !b.is_empty())
        .collect();
    if benefits.is_empty() {
        None
    } else {
        Some(benefits[index % benefits.len()])
    }
}

fn normalize(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render the image-generation prompt for one job.
pub fn render_prompt(
    facts: &ProductFacts,
    prefs: &Preferences,
    format: ImageFormat,
    position: JobPosition,
) -> String {
    let benefit = benefit_at(facts, position.global_index)
        .map(|b| format!("highlighting {b},"))
        .unwrap_or_default();
    let angle = CAMERA_ANGLES[position.global_index % CAMERA_ANGLES.len()];

    let text = format!(
        "Professional marketing photograph of {name}, a {category} product, {benefit} \
         {style} style, {mood} color palette, {lighting} lighting, {composition}, \
         set in {scene} during {time}. {angle}. {framing}. {overlay}. {compliance}. \
         Variation {n} of {total} for the {format} set.",
        name = facts.name.trim(),
        category = facts.category.trim(),
        style = or_default(&prefs.brand_style, DEFAULT_BRAND_STYLE),
        mood = or_default(&prefs.color_mood, DEFAULT_COLOR_MOOD),
        lighting = or_default(&prefs.lighting, DEFAULT_LIGHTING),
        composition = or_default(&prefs.composition, DEFAULT_COMPOSITION),
        scene = or_default(&prefs.scene_type, DEFAULT_SCENE),
        time = or_default(&prefs.time_of_day, DEFAULT_TIME_OF_DAY),
        framing = format.framing(),
        overlay = overlay_phrase(prefs.text_overlay),
        compliance = compliance_phrase(&facts.category),
        n = position.format_index + 1,
        total = position.format_total,
        format = format.tag(),
    );
    normalize(&text)
}

/// Render the marketing copy bundle stored alongside one job's image.
pub fn render_copy(facts: &ProductFacts, position: JobPosition) -> MarketingCopy {
    let name = facts.name.trim();
    let headline = match benefit_at(facts, position.global_index) {
        Some(benefit) => format!("{name}: {benefit}"),
        None => format!("Meet {name}"),
    };
    let body = normalize(&format!(
        "Discover {name}, the {category} made for everyday life. {extra}",
        category = facts.category.trim().to_lowercase(),
        extra = benefit_at(facts, position.global_index + 1)
            .filter(|_| facts.benefits.len() > 1)
            .map(|b| format!("Also {b}."))
            .unwrap_or_default(),
    ));
    let call_to_action = CALLS_TO_ACTION[position.global_index % CALLS_TO_ACTION.len()].to_string();

    let hashtags = [name, facts.category.trim()]
        .iter()
        .map(|s| NON_TAG_RE.replace_all(s, "").to_lowercase())
        .filter(|s| !s.is_empty())
        .map(|s| format!("#{s}"))
        .collect();

    MarketingCopy {
        headline,
        body,
        call_to_action,
        hashtags,
    }
}
