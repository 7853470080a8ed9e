//! Collaborator seams consumed by the pipeline.
//!
//! The orchestrator and archive builder never reach into global state;
//! they receive these traits as `Arc<dyn ...>` constructor arguments.
//! Implementations: `adgen-imagegen` (generation over HTTP),
//! `adgen-storage` (filesystem blobs), `adgen-db` (PostgreSQL records).

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use uuid::Uuid;

use crate::campaign::{
    Campaign, CampaignStatus, GeneratedImageRecord, NewGeneratedImage, Preferences,
};
use crate::deadline::Retryable;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Image generation
// ---------------------------------------------------------------------------

/// One call to the generation capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
}

/// Image data as returned by a generation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    /// Raw encoded image bytes.
    Bytes(Vec<u8>),
    /// Base64 text, optionally prefixed with a `data:...;base64,` header.
    Base64(String),
}

/// A payload could not be turned into image bytes.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is empty")]
    Empty,
}

impl ImagePayload {
    /// Decode into raw image bytes.
    pub fn decode(self) -> Result<Vec<u8>, PayloadError> {
        let bytes = match self {
            Self::Bytes(bytes) => bytes,
            Self::Base64(text) => {
                let data = match text.split_once(";base64,") {
                    Some((header, data)) if header.starts_with("data:") => data,
                    _ => text.as_str(),
                };
                BASE64.decode(data.trim())?
            }
        };
        if bytes.is_empty() {
            return Err(PayloadError::Empty);
        }
        Ok(bytes)
    }
}

/// Failure reported by the generation capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Timeout, rate limit, or upstream server fault. Worth retrying.
    #[error("retryable generation error: {0}")]
    Retryable(String),

    /// The request itself was rejected. Retrying will not help.
    #[error("fatal generation error: {0}")]
    Fatal(String),
}

impl Retryable for GenerationError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// The paid, unreliable external image-generation capability.
#[async_trait]
pub trait ImageGenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<ImagePayload, GenerationError>;
}

// ---------------------------------------------------------------------------
// Blob storage
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("storage I/O error: {0}")]
    Io(String),
}

/// Durable blob storage for generated images and archives.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Download location handed to end users for a stored key.
    fn public_url(&self, key: &str) -> String;
}

// ---------------------------------------------------------------------------
// Record storage
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error("record store error: {0}")]
    Backend(String),
}

/// Outcome of trying to take the single-flight run claim for a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunClaim {
    /// The caller now owns the run; status is `generating`.
    Claimed,
    /// Another run is active and not stale. Nothing was changed.
    AlreadyRunning,
    /// The campaign already completed its generation run. Nothing was changed.
    AlreadyCompleted,
    /// No such campaign.
    NotFound,
}

/// Persistence for campaigns and generated image records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a campaign in `generating` status with no active run.
    async fn create_campaign(
        &self,
        product_id: &str,
        preferences: &Preferences,
    ) -> Result<Campaign, StoreError>;

    async fn get_campaign(&self, campaign_id: DbId) -> Result<Option<Campaign>, StoreError>;

    /// Atomically claim the campaign for the run identified by `run_id`.
    ///
    /// Succeeds when no run is active, or when the active run started more
    /// than `stale_after` ago; a stale claim passes to the new run. On
    /// success the status is set to `generating`. Completed campaigns are
    /// never claimed again.
    async fn begin_run(
        &self,
        campaign_id: DbId,
        run_id: Uuid,
        stale_after: Duration,
    ) -> Result<RunClaim, StoreError>;

    /// Write the terminal status of run `run_id` and release its claim.
    ///
    /// Only the run currently holding the claim may do this. Returns
    /// `false`, changing nothing, when the claim has passed to another run.
    async fn finish_run(
        &self,
        campaign_id: DbId,
        run_id: Uuid,
        status: CampaignStatus,
    ) -> Result<bool, StoreError>;

    /// Persist one generated image. Records are created with `selected = true`.
    async fn save_generated_image(
        &self,
        image: &NewGeneratedImage,
    ) -> Result<GeneratedImageRecord, StoreError>;

    /// All images of a campaign, oldest first.
    async fn get_campaign_images(
        &self,
        campaign_id: DbId,
    ) -> Result<Vec<GeneratedImageRecord>, StoreError>;

    /// Selection toggle used by the external review UI.
    async fn set_image_selected(&self, image_id: DbId, selected: bool) -> Result<(), StoreError>;

    /// Attach a packaged archive to a completed campaign.
    ///
    /// Never touches the status or the run claim. Returns `false`, changing
    /// nothing, when the campaign is not `completed` or a run is active.
    async fn attach_archive(
        &self,
        campaign_id: DbId,
        download_url: &str,
        expires_at: Timestamp,
    ) -> Result<bool, StoreError>;
}
