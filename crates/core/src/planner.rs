//! Job planner: turns product facts and preferences into generation jobs.
//!
//! Planning is pure and side-effect free. Invalid input is rejected with
//! [`CoreError::Validation`] before any job is produced.

use std::collections::HashSet;

use crate::campaign::{Preferences, ProductFacts};
use crate::error::CoreError;
use crate::format::ImageFormat;
use crate::marketing_copy::MarketingCopy;
use crate::prompt::{render_copy, render_prompt, JobPosition};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Hard ceiling on images per campaign.
pub const MAX_IMAGE_COUNT: i32 = 50;

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One planned unit of generation work.
///
/// `attempt_count` and `last_error` are per-attempt state owned by the
/// orchestrator run executing the job.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub index: usize,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub prompt_text: String,
    pub copy: MarketingCopy,
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate preferences and resolve their format tags, preserving order.
pub fn resolve_formats(prefs: &Preferences) -> Result<Vec<ImageFormat>, CoreError> {
    if prefs.image_count <= 0 {
        return Err(CoreError::Validation(format!(
            "image_count must be positive (got {})",
            prefs.image_count
        )));
    }
    if prefs.image_count > MAX_IMAGE_COUNT {
        return Err(CoreError::Validation(format!(
            "image_count must not exceed {MAX_IMAGE_COUNT} (got {})",
            prefs.image_count
        )));
    }
    if prefs.formats.is_empty() {
        return Err(CoreError::Validation(
            "At least one image format must be requested".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut formats = Vec::with_capacity(prefs.formats.len());
    for tag in &prefs.formats {
        let format = ImageFormat::from_tag(tag)?;
        if !seen.insert(format) {
            return Err(CoreError::Validation(format!(
                "Image format '{format}' is requested more than once"
            )));
        }
        formats.push(format);
    }
    Ok(formats)
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// Split `total` jobs across `formats`.
///
/// Every format gets `total / n`; the first `total % n` formats get one
/// extra. The sum is always exactly `total`, and when `total >= n` every
/// format receives at least one job. Formats left with zero (only possible
/// when `total < n`) are still listed.
pub fn allocate(total: usize, formats: &[ImageFormat]) -> Vec<(ImageFormat, usize)> {
    if formats.is_empty() {
        return Vec::new();
    }
    let base = total / formats.len();
    let extra = total % formats.len();
    formats
        .iter()
        .enumerate()
        .map(|(i, f)| (*f, base + usize::from(i < extra)))
        .collect()
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Build the ordered job list for one campaign.
///
/// Jobs are grouped by format in the order the formats were requested.
pub fn plan(facts: &ProductFacts, prefs: &Preferences) -> Result<Vec<Job>, CoreError> {
    if facts.name.trim().is_empty() {
        return Err(CoreError::Validation(
            "Product name must not be empty".to_string(),
        ));
    }
    let formats = resolve_formats(prefs)?;
    let total = prefs.image_count as usize;

    let mut jobs = Vec::with_capacity(total);
    for (format, count) in allocate(total, &formats) {
        let (width, height) = format.dimensions();
        for format_index in 0..count {
            let position = JobPosition {
                global_index: jobs.len(),
                format_index,
                format_total: count,
            };
            jobs.push(Job {
                index: position.global_index,
                format,
                width,
                height,
                prompt_text: render_prompt(facts, prefs, format, position),
                copy: render_copy(facts, position),
                attempt_count: 0,
                last_error: None,
            });
        }
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ALL_FORMATS;
    use assert_matches::assert_matches;

    fn facts() -> ProductFacts {
        ProductFacts {
            product_id: "sku-42".into(),
            name: "Trail Runner X".into(),
            category: "Footwear".into(),
            benefits: vec!["lightweight grip".into()],
        }
    }

    fn count_for(jobs: &[Job], format: ImageFormat) -> usize {
        jobs.iter().filter(|j| j.format == format).count()
    }

    #[test]
    fn five_images_over_two_formats_split_three_two() {
        let jobs = plan(&facts(), &Preferences::new(5, &["square", "story"])).unwrap();
        assert_eq!(jobs.len(), 5);
        assert_eq!(count_for(&jobs, ImageFormat::Square), 3);
        assert_eq!(count_for(&jobs, ImageFormat::Story), 2);
    }

    #[test]
    fn allocation_covers_every_format_when_total_suffices() {
        for n in 1..=ALL_FORMATS.len() {
            let formats = &ALL_FORMATS[..n];
            for total in n..=MAX_IMAGE_COUNT as usize {
                let alloc = allocate(total, formats);
                assert_eq!(alloc.iter().map(|(_, c)| c).sum::<usize>(), total);
                assert!(alloc.iter().all(|(_, c)| *c >= 1), "total={total} n={n}");
            }
        }
    }

    #[test]
    fn allocation_with_fewer_images_than_formats() {
        let alloc = allocate(2, &ALL_FORMATS[..4]);
        let counts: Vec<usize> = alloc.iter().map(|(_, c)| *c).collect();
        assert_eq!(counts, vec![1, 1, 0, 0]);
    }

    #[test]
    fn jobs_carry_format_dimensions_and_sequential_indexes() {
        let jobs = plan(&facts(), &Preferences::new(3, &["banner", "portrait"])).unwrap();
        assert_eq!(
            jobs.iter().map(|j| j.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!((jobs[0].width, jobs[0].height), (1536, 512));
        assert_eq!((jobs[2].width, jobs[2].height), (896, 1152));
        assert!(jobs.iter().all(|j| j.attempt_count == 0 && j.last_error.is_none()));
    }

    #[test]
    fn prompts_differ_across_jobs() {
        let jobs = plan(&facts(), &Preferences::new(4, &["square"])).unwrap();
        let unique: HashSet<&str> = jobs.iter().map(|j| j.prompt_text.as_str()).collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn planning_is_deterministic() {
        let prefs = Preferences::new(6, &["square", "landscape"]);
        assert_eq!(plan(&facts(), &prefs).unwrap(), plan(&facts(), &prefs).unwrap());
    }

    #[test]
    fn zero_or_negative_count_is_rejected() {
        assert_matches!(
            plan(&facts(), &Preferences::new(0, &["square"])),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            plan(&facts(), &Preferences::new(-3, &["square"])),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn count_above_ceiling_is_rejected() {
        assert_matches!(
            plan(&facts(), &Preferences::new(MAX_IMAGE_COUNT + 1, &["square"])),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn empty_format_list_is_rejected() {
        assert_matches!(
            plan(&facts(), &Preferences::new(3, &[])),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert_matches!(
            plan(&facts(), &Preferences::new(3, &["square", "hologram"])),
            Err(CoreError::Validation(msg)) if msg.contains("hologram")
        );
    }

    #[test]
    fn duplicate_format_is_rejected() {
        assert_matches!(
            plan(&facts(), &Preferences::new(3, &["square", "Square"])),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn blank_product_name_is_rejected() {
        let mut f = facts();
        f.name = " ".into();
        assert_matches!(
            plan(&f, &Preferences::new(1, &["square"])),
            Err(CoreError::Validation(_))
        );
    }
}
