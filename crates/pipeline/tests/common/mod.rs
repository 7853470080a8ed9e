//! In-memory collaborators shared by the pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adgen_core::campaign::{
    Campaign, CampaignStatus, GeneratedImageRecord, NewGeneratedImage, Preferences, ProductFacts,
};
use adgen_core::services::{
    BlobStore, GenerationError, GenerationRequest, ImageGenerationService, ImagePayload,
    RecordStore, RunClaim, StorageError, StoreError,
};
use adgen_core::types::{DbId, Timestamp};
use adgen_pipeline::{PipelineConfig, Scheduling};
use async_trait::async_trait;
use tokio::time::Instant;
use uuid::Uuid;

/// Smallest byte string recognised as a PNG.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

pub fn facts() -> ProductFacts {
    ProductFacts {
        product_id: "sku-100".into(),
        name: "Aurora Desk Lamp".into(),
        category: "home".into(),
        benefits: vec!["warm adjustable light".into(), "folds flat".into()],
    }
}

/// Small deadlines and delays so paused-clock tests stay readable.
pub fn test_config(max_concurrent: usize) -> PipelineConfig {
    PipelineConfig {
        max_concurrent,
        generation_timeout: Duration::from_secs(5),
        max_attempts: 3,
        retry_base_delay: Duration::from_millis(100),
        scheduling: Scheduling::Waves,
        upload_timeout: Duration::from_secs(2),
        record_timeout: Duration::from_secs(2),
        archive_timeout: Duration::from_secs(30),
        archive_expiry_hours: 24,
        stale_run_after: Duration::from_secs(3600),
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// What the fake generator does for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Retryable,
    Fatal,
    /// Never answers; only a deadline ends the call.
    Hang,
    /// Returns base64 text that does not decode.
    BadPayload,
}

type Script = Box<dyn Fn(&GenerationRequest, u32) -> Behavior + Send + Sync>;

/// Scripted [`ImageGenerationService`].
///
/// The script sees the request and the 1-based attempt number for that
/// prompt. Tracks total calls and peak concurrency.
pub struct FakeGenerator {
    script: Script,
    latency: Duration,
    attempts: Mutex<HashMap<String, u32>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeGenerator {
    pub fn new(script: impl Fn(&GenerationRequest, u32) -> Behavior + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            latency: Duration::from_millis(50),
            attempts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn always(behavior: Behavior) -> Self {
        Self::new(move |_, _| behavior)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even when the call is dropped by a
/// deadline or cancellation.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageGenerationService for FakeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<ImagePayload, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(request.prompt.clone()).or_insert(0);
            *n += 1;
            *n
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let behavior = (self.script)(request, attempt);
        if behavior == Behavior::Hang {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.latency).await;

        match behavior {
            Behavior::Succeed => Ok(ImagePayload::Bytes(PNG_BYTES.to_vec())),
            Behavior::Retryable => Err(GenerationError::Retryable("upstream 503".into())),
            Behavior::Fatal => Err(GenerationError::Fatal("content policy violation".into())),
            Behavior::BadPayload => Ok(ImagePayload::Base64("%%% not base64 %%%".into())),
            Behavior::Hang => unreachable!(),
        }
    }
}

// ---------------------------------------------------------------------------
// Blob store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, (Vec<u8>, String)>>,
    puts: AtomicUsize,
    gets: AtomicUsize,
    fail_puts: AtomicBool,
    get_delay: Mutex<Duration>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total `put` + `get` calls.
    pub fn calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst) + self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn set_get_delay(&self, delay: Duration) {
        *self.get_delay.lock().unwrap() = delay;
    }

    pub fn remove(&self, key: &str) {
        self.blobs.lock().unwrap().remove(key);
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(key).map(|(b, _)| b.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.blobs.lock().unwrap().get(key).map(|(_, ct)| ct.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Io("disk full".into()));
        }
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let delay = *self.get_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .map(|(b, _)| b.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://downloads.test/{key}")
    }
}

// ---------------------------------------------------------------------------
// Record store
// ---------------------------------------------------------------------------

struct CampaignState {
    campaign: Campaign,
    /// Token and start time of the run holding the claim.
    run: Option<(Uuid, Instant)>,
}

#[derive(Default)]
struct RecordState {
    campaigns: HashMap<DbId, CampaignState>,
    images: Vec<GeneratedImageRecord>,
    next_id: DbId,
}

impl RecordState {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryRecordStore {
    state: Mutex<RecordState>,
    fail_saves: AtomicBool,
    status_writes: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    pub fn campaign(&self, id: DbId) -> Campaign {
        self.state.lock().unwrap().campaigns[&id].campaign.clone()
    }

    pub fn image_count(&self, campaign_id: DbId) -> usize {
        self.state
            .lock()
            .unwrap()
            .images
            .iter()
            .filter(|i| i.campaign_id == campaign_id)
            .count()
    }

    pub fn run_active(&self, id: DbId) -> bool {
        self.state.lock().unwrap().campaigns[&id].run.is_some()
    }

    /// Drive a campaign through one successful claim and finish, the state
    /// packaging normally starts from.
    pub async fn complete(&self, campaign_id: DbId) {
        let run_id = Uuid::now_v7();
        let claim = self
            .begin_run(campaign_id, run_id, Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(claim, RunClaim::Claimed);
        assert!(self
            .finish_run(campaign_id, run_id, CampaignStatus::Completed)
            .await
            .unwrap());
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create_campaign(
        &self,
        product_id: &str,
        preferences: &Preferences,
    ) -> Result<Campaign, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let now = chrono::Utc::now();
        let campaign = Campaign {
            id,
            product_id: product_id.to_string(),
            preferences: preferences.clone(),
            status: CampaignStatus::Generating,
            run_active: false,
            download_url: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        state.campaigns.insert(
            id,
            CampaignState {
                campaign: campaign.clone(),
                run: None,
            },
        );
        Ok(campaign)
    }

    async fn get_campaign(&self, campaign_id: DbId) -> Result<Option<Campaign>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .campaigns
            .get(&campaign_id)
            .map(|c| c.campaign.clone()))
    }

    async fn begin_run(
        &self,
        campaign_id: DbId,
        run_id: Uuid,
        stale_after: Duration,
    ) -> Result<RunClaim, StoreError> {
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.campaigns.get_mut(&campaign_id) else {
            return Ok(RunClaim::NotFound);
        };
        let now = Instant::now();
        if let Some((_, started)) = entry.run {
            if now.duration_since(started) <= stale_after {
                return Ok(RunClaim::AlreadyRunning);
            }
        }
        if entry.campaign.status == CampaignStatus::Completed {
            return Ok(RunClaim::AlreadyCompleted);
        }
        entry.run = Some((run_id, now));
        entry.campaign.run_active = true;
        entry.campaign.status = CampaignStatus::Generating;
        Ok(RunClaim::Claimed)
    }

    async fn finish_run(
        &self,
        campaign_id: DbId,
        run_id: Uuid,
        status: CampaignStatus,
    ) -> Result<bool, StoreError> {
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.campaigns.get_mut(&campaign_id) else {
            return Ok(false);
        };
        if !matches!(entry.run, Some((holder, _)) if holder == run_id) {
            return Ok(false);
        }
        entry.run = None;
        entry.campaign.run_active = false;
        entry.campaign.status = status;
        entry.campaign.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn save_generated_image(
        &self,
        image: &NewGeneratedImage,
    ) -> Result<GeneratedImageRecord, StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection reset".into()));
        }
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let record = GeneratedImageRecord {
            id,
            campaign_id: image.campaign_id,
            format: image.format.clone(),
            prompt_text: image.prompt_text.clone(),
            width: image.width,
            height: image.height,
            storage_key: image.storage_key.clone(),
            content_type: image.content_type.clone(),
            selected: true,
            marketing_copy: image.marketing_copy.clone(),
            created_at: chrono::Utc::now(),
        };
        state.images.push(record.clone());
        Ok(record)
    }

    async fn get_campaign_images(
        &self,
        campaign_id: DbId,
    ) -> Result<Vec<GeneratedImageRecord>, StoreError> {
        let mut images: Vec<GeneratedImageRecord> = self
            .state
            .lock()
            .unwrap()
            .images
            .iter()
            .filter(|i| i.campaign_id == campaign_id)
            .cloned()
            .collect();
        images.sort_by_key(|i| i.id);
        Ok(images)
    }

    async fn set_image_selected(&self, image_id: DbId, selected: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let image = state
            .images
            .iter_mut()
            .find(|i| i.id == image_id)
            .ok_or(StoreError::NotFound {
                entity: "GeneratedImage",
                id: image_id,
            })?;
        image.selected = selected;
        Ok(())
    }

    async fn attach_archive(
        &self,
        campaign_id: DbId,
        download_url: &str,
        expires_at: Timestamp,
    ) -> Result<bool, StoreError> {
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let entry = state
            .campaigns
            .get_mut(&campaign_id)
            .ok_or(StoreError::NotFound {
                entity: "Campaign",
                id: campaign_id,
            })?;
        if entry.run.is_some() || entry.campaign.status != CampaignStatus::Completed {
            return Ok(false);
        }
        entry.campaign.download_url = Some(download_url.to_string());
        entry.campaign.expires_at = Some(expires_at);
        entry.campaign.updated_at = chrono::Utc::now();
        Ok(true)
    }
}

/// Convenience bundle of fakes.
pub struct Fakes {
    pub generator: Arc<FakeGenerator>,
    pub blobs: Arc<MemoryBlobStore>,
    pub records: Arc<MemoryRecordStore>,
}

impl Fakes {
    pub fn new(generator: FakeGenerator) -> Self {
        Self {
            generator: Arc::new(generator),
            blobs: Arc::new(MemoryBlobStore::new()),
            records: Arc::new(MemoryRecordStore::new()),
        }
    }

    pub fn orchestrator(&self, config: PipelineConfig) -> adgen_pipeline::Orchestrator {
        adgen_pipeline::Orchestrator::new(
            self.generator.clone(),
            self.blobs.clone(),
            self.records.clone(),
            config,
        )
    }

    pub fn archive_builder(&self, config: PipelineConfig) -> adgen_pipeline::ArchiveBuilder {
        adgen_pipeline::ArchiveBuilder::new(self.blobs.clone(), self.records.clone(), config)
    }

    pub async fn campaign(&self, preferences: &Preferences) -> Campaign {
        self.records
            .create_campaign("sku-100", preferences)
            .await
            .unwrap()
    }
}
