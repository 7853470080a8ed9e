//! Archive builder.
//!
//! Packages a caller-selected subset of a campaign's generated images into
//! one ZIP archive:
//!
//! ```text
//! manifest.json
//! images/01_square_42.png
//! images/02_story_43.jpg
//! copy/42.json
//! ```
//!
//! Image entries are stored uncompressed (they are already compressed);
//! manifest and copy fragments are deflated. Fetching, packing, and the
//! archive upload share a single deadline. Only after the upload succeeds
//! is the campaign updated with its download link, so a failed build never
//! exposes a partial archive.
//!
//! Packaging belongs to the phase after generation: a campaign must be
//! `completed` with no active run, otherwise the build is refused before
//! any storage call. The builder never writes the campaign status or the
//! run claim.

use std::io::{Cursor, Write};
use std::sync::Arc;

use adgen_core::campaign::{CampaignStatus, GeneratedImageRecord};
use adgen_core::deadline::{with_deadline, DeadlineError};
use adgen_core::hashing::sha256_hex;
use adgen_core::manifest::{
    copy_entry_name, image_entry_name, ArchiveManifest, ManifestImage, ManifestInfo,
    MANIFEST_ENTRY_NAME,
};
use adgen_core::marketing_copy::MarketingCopy;
use adgen_core::services::{BlobStore, RecordStore};
use adgen_core::storage::{archive_storage_key, CONTENT_TYPE_ZIP};
use adgen_core::types::{DbId, Timestamp};
use adgen_events::{event_types, CampaignEvent, EventBus};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::PipelineConfig;

/// Label carried by a build timeout.
const BUILD_LABEL: &str = "archive.build";

/// Packaging failures. None of them alter the campaign's status.
#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("no images are selected for packaging")]
    EmptySelection,

    #[error("campaign {0} not found")]
    CampaignNotFound(DbId),

    #[error("campaign {0} has an active generation run")]
    RunActive(DbId),

    #[error("campaign {campaign_id} is {status}, only completed campaigns can be packaged")]
    NotCompleted {
        campaign_id: DbId,
        status: CampaignStatus,
    },

    #[error("none of the {0} selected images could be fetched")]
    NothingFetched(usize),

    #[error("{label} timed out after {timeout_ms}ms")]
    Timeout { label: String, timeout_ms: u64 },

    #[error("archive upload failed: {0}")]
    Upload(String),

    #[error("archive build failed: {0}")]
    Build(String),

    #[error("record store error: {0}")]
    Store(String),
}

/// A successfully packaged and published archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveResult {
    pub campaign_id: DbId,
    pub storage_key: String,
    pub download_url: String,
    pub expires_at: Timestamp,
    pub image_count: usize,
    pub copy_count: usize,
    /// Selected images left out because their bytes were unavailable.
    pub missing_images: Vec<DbId>,
}

/// Builds and publishes campaign archives.
pub struct ArchiveBuilder {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    events: Option<Arc<EventBus>>,
    config: PipelineConfig,
}

/// Bytes fetched for one selected image.
struct FetchedImage {
    record: GeneratedImageRecord,
    bytes: Vec<u8>,
}

/// Output of the blocking packing step.
#[derive(Debug)]
struct PackedArchive {
    bytes: Vec<u8>,
    manifest: ArchiveManifest,
}

impl ArchiveBuilder {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            blobs,
            records,
            events: None,
            config,
        }
    }

    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Package `images` for `campaign_id` and attach the download link.
    ///
    /// Records with `selected == false` are ignored. An empty selection, an
    /// active run, or a campaign that is not `completed` fails before any
    /// blob storage call is made.
    pub async fn build(
        &self,
        campaign_id: DbId,
        images: &[GeneratedImageRecord],
        info: &ManifestInfo,
    ) -> Result<ArchiveResult, PackagingError> {
        let selected: Vec<GeneratedImageRecord> =
            images.iter().filter(|i| i.selected).cloned().collect();
        if selected.is_empty() {
            return Err(PackagingError::EmptySelection);
        }
        self.ensure_packageable(campaign_id).await?;

        let started_at = Utc::now();
        let (storage_key, manifest, size) = with_deadline(
            self.package_and_upload(campaign_id, selected, info, started_at),
            self.config.archive_timeout,
            BUILD_LABEL,
        )
        .await
        .map_err(|e| match e {
            DeadlineError::Timeout { label, timeout_ms } => {
                tracing::error!(campaign_id, timeout_ms, "Archive build timed out");
                PackagingError::Timeout { label, timeout_ms }
            }
            DeadlineError::Cancelled { label } => {
                PackagingError::Build(format!("{label} was cancelled"))
            }
            DeadlineError::Operation(e) => e,
        })?;

        let download_url = self.blobs.public_url(&storage_key);
        let expires_at =
            Utc::now() + chrono::Duration::hours(i64::from(self.config.archive_expiry_hours));

        let attached = with_deadline(
            self.records
                .attach_archive(campaign_id, &download_url, expires_at),
            self.config.record_timeout,
            "record.attach_archive",
        )
        .await
        .map_err(|e| PackagingError::Store(e.to_string()))?;
        if !attached {
            tracing::warn!(
                campaign_id,
                key = %storage_key,
                "Generation run started during packaging, archive left unattached",
            );
            return Err(PackagingError::RunActive(campaign_id));
        }

        let result = ArchiveResult {
            campaign_id,
            storage_key,
            download_url,
            expires_at,
            image_count: manifest.images.len(),
            copy_count: manifest.copy_count(),
            missing_images: manifest.missing_images,
        };

        tracing::info!(
            campaign_id,
            key = %result.storage_key,
            images = result.image_count,
            copies = result.copy_count,
            missing = result.missing_images.len(),
            size,
            "Campaign archive published",
        );
        if let Some(bus) = &self.events {
            bus.publish(
                CampaignEvent::new(event_types::ARCHIVE_READY, campaign_id).with_payload(
                    serde_json::json!({
                        "download_url": &result.download_url,
                        "expires_at": result.expires_at,
                        "image_count": result.image_count,
                    }),
                ),
            );
        }

        Ok(result)
    }

    /// Refuse campaigns that are still generating or never completed.
    async fn ensure_packageable(&self, campaign_id: DbId) -> Result<(), PackagingError> {
        let campaign = with_deadline(
            self.records.get_campaign(campaign_id),
            self.config.record_timeout,
            "record.get_campaign",
        )
        .await
        .map_err(|e| PackagingError::Store(e.to_string()))?
        .ok_or(PackagingError::CampaignNotFound(campaign_id))?;

        if campaign.run_active {
            tracing::warn!(campaign_id, "Refusing to package during an active generation run");
            return Err(PackagingError::RunActive(campaign_id));
        }
        if campaign.status != CampaignStatus::Completed {
            return Err(PackagingError::NotCompleted {
                campaign_id,
                status: campaign.status,
            });
        }
        Ok(())
    }

    /// Fetch, pack, and upload. Runs entirely under the build deadline.
    async fn package_and_upload(
        &self,
        campaign_id: DbId,
        selected: Vec<GeneratedImageRecord>,
        info: &ManifestInfo,
        generated_at: Timestamp,
    ) -> Result<(String, ArchiveManifest, usize), PackagingError> {
        let total = selected.len();
        let (fetched, missing) = self.fetch_all(campaign_id, selected).await;
        if fetched.is_empty() {
            return Err(PackagingError::NothingFetched(total));
        }

        let info = info.clone();
        let packed = tokio::task::spawn_blocking(move || {
            pack_archive(campaign_id, &info, fetched, missing, generated_at)
        })
        .await
        .map_err(|e| PackagingError::Build(format!("packing task failed: {e}")))??;

        let PackedArchive { bytes, manifest } = packed;
        let size = bytes.len();
        let storage_key = archive_storage_key(campaign_id, generated_at);
        self.blobs
            .put(&storage_key, bytes, CONTENT_TYPE_ZIP)
            .await
            .map_err(|e| PackagingError::Upload(e.to_string()))?;

        Ok((storage_key, manifest, size))
    }

    /// Fetch every selected image concurrently, preserving order.
    ///
    /// Unavailable images are reported by id instead of failing the build.
    async fn fetch_all(
        &self,
        campaign_id: DbId,
        selected: Vec<GeneratedImageRecord>,
    ) -> (Vec<FetchedImage>, Vec<DbId>) {
        let results = join_all(selected.iter().map(|r| self.blobs.get(&r.storage_key))).await;

        let mut fetched = Vec::with_capacity(selected.len());
        let mut missing = Vec::new();
        for (record, result) in selected.into_iter().zip(results) {
            match result {
                Ok(bytes) => fetched.push(FetchedImage { record, bytes }),
                Err(e) => {
                    tracing::warn!(
                        campaign_id,
                        image_id = record.id,
                        key = %record.storage_key,
                        error = %e,
                        "Selected image unavailable, leaving it out of the archive",
                    );
                    missing.push(record.id);
                }
            }
        }
        (fetched, missing)
    }
}

// ---------------------------------------------------------------------------
// Packing
// ---------------------------------------------------------------------------

/// One image ready to be written, with its parsed copy if usable.
struct PreparedEntry {
    name: String,
    bytes: Vec<u8>,
    copy: Option<(String, Vec<u8>)>,
}

/// Assemble the manifest and write the ZIP into memory.
fn pack_archive(
    campaign_id: DbId,
    info: &ManifestInfo,
    images: Vec<FetchedImage>,
    missing: Vec<DbId>,
    generated_at: Timestamp,
) -> Result<PackedArchive, PackagingError> {
    let mut manifest = ArchiveManifest::new(campaign_id, info, generated_at);
    manifest.missing_images = missing;

    let mut entries = Vec::with_capacity(images.len());
    for (position, FetchedImage { record, bytes }) in images.into_iter().enumerate() {
        let copy = match record.marketing_copy.as_deref().map(MarketingCopy::parse) {
            None => None,
            Some(Ok(copy)) => {
                let json = copy
                    .to_json()
                    .map_err(|e| PackagingError::Build(e.to_string()))?;
                Some((copy_entry_name(record.id), json.into_bytes()))
            }
            Some(Err(e)) => {
                tracing::warn!(
                    campaign_id,
                    image_id = record.id,
                    error = %e,
                    "Omitting unreadable marketing copy",
                );
                manifest.copy_omitted.push(record.id);
                None
            }
        };

        let name = image_entry_name(position + 1, &record.format, record.id, &record.content_type);
        manifest.push_image(ManifestImage {
            image_id: record.id,
            file_name: name.clone(),
            format: record.format.clone(),
            width: record.width,
            height: record.height,
            prompt: record.prompt_text.clone(),
            sha256: sha256_hex(&bytes),
            has_copy: copy.is_some(),
        });
        entries.push(PreparedEntry { name, bytes, copy });
    }

    let problems = manifest.validate();
    if !problems.is_empty() {
        return Err(PackagingError::Build(problems.join("; ")));
    }
    let manifest_bytes = manifest
        .to_json_bytes()
        .map_err(|e| PackagingError::Build(e.to_string()))?;

    let bytes = write_zip(&manifest_bytes, &entries).map_err(|e| PackagingError::Build(e.to_string()))?;
    Ok(PackedArchive { bytes, manifest })
}

fn stored() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
}

fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn write_zip(manifest: &[u8], entries: &[PreparedEntry]) -> zip::result::ZipResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file(MANIFEST_ENTRY_NAME, deflated())?;
    zip.write_all(manifest)?;

    for entry in entries {
        zip.start_file(entry.name.as_str(), stored())?;
        zip.write_all(&entry.bytes)?;
    }
    for (name, json) in entries.iter().filter_map(|e| e.copy.as_ref()) {
        zip.start_file(name.as_str(), deflated())?;
        zip.write_all(json)?;
    }

    Ok(zip.finish()?.into_inner())
}
