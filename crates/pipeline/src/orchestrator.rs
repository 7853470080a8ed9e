//! Generation orchestrator.
//!
//! Executes a planned job list for one campaign against the external
//! image-generation service. Each job runs under a per-attempt deadline
//! with bounded retries; successes are uploaded and persisted immediately,
//! failures are collected without aborting the batch. Concurrency is
//! capped at `max_concurrent`, either in barrier waves or a bounded pool
//! (see [`Scheduling`]).
//!
//! A run takes the campaign's single-flight claim first, identified by its
//! `run_id`, and writes a terminal status when it finishes: `completed` if
//! the campaign holds at least one image, `failed` otherwise. A run whose
//! claim was taken over as stale leaves the status to its successor.

use std::sync::Arc;

use adgen_core::campaign::{CampaignStatus, NewGeneratedImage};
use adgen_core::deadline::{
    linear_backoff, with_deadline, with_deadline_cancellable, with_retry_cancellable, Attempted,
    DeadlineError, ExhaustedError,
};
use adgen_core::planner::Job;
use adgen_core::services::{
    BlobStore, GenerationError, GenerationRequest, ImageGenerationService, RecordStore, RunClaim,
};
use adgen_core::storage::{detect_content_type, image_storage_key};
use adgen_core::types::DbId;
use adgen_events::{event_types, CampaignEvent, EventBus};
use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{PipelineConfig, Scheduling};
use crate::summary::{JobFailure, JobFailureReason, JobOutcome, RunSummary};

/// Errors that abort or fail a run as a whole.
///
/// Per-job failures never surface here; they are counted in the
/// [`RunSummary`].
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("campaign {0} not found")]
    NotFound(DbId),

    #[error("campaign {campaign_id} already has an active generation run")]
    AlreadyRunning { campaign_id: DbId },

    #[error("campaign {campaign_id} has already completed its generation run")]
    AlreadyCompleted { campaign_id: DbId },

    /// Every job of this run failed. The campaign is marked `failed` unless
    /// it still holds images from an earlier, taken-over run.
    #[error("no images could be generated for campaign {}", .0.campaign_id)]
    BatchExhausted(Box<RunSummary>),

    #[error("record store error: {0}")]
    Store(String),
}

/// Runs generation jobs for campaigns.
///
/// Collaborators are injected; the orchestrator holds no per-run state, so
/// one instance can serve distinct campaigns concurrently.
pub struct Orchestrator {
    generator: Arc<dyn ImageGenerationService>,
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    events: Option<Arc<EventBus>>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn ImageGenerationService>,
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            generator,
            blobs,
            records,
            events: None,
            config,
        }
    }

    /// Publish progress events to `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Execute `jobs` for `campaign_id`.
    ///
    /// Returns the summary on full or partial success. A run in which every
    /// job failed returns [`OrchestratorError::BatchExhausted`] carrying the
    /// summary. Triggering `cancel` stops further dispatch; undispatched and
    /// interrupted jobs are counted as cancelled failures.
    pub async fn run(
        &self,
        campaign_id: DbId,
        jobs: Vec<Job>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, OrchestratorError> {
        if jobs.is_empty() {
            return Err(OrchestratorError::Validation(
                "A run needs at least one job".into(),
            ));
        }

        let run_id = Uuid::now_v7();
        self.claim(campaign_id, run_id).await?;

        let requested = jobs.len();
        tracing::info!(
            %run_id,
            campaign_id,
            requested,
            max_concurrent = self.config.max_concurrent,
            scheduling = ?self.config.scheduling,
            "Generation run started",
        );
        self.publish(
            CampaignEvent::new(event_types::RUN_STARTED, campaign_id).with_payload(
                serde_json::json!({ "run_id": run_id, "requested": requested }),
            ),
        );

        let outcomes = match self.config.scheduling {
            Scheduling::Waves => self.run_waves(campaign_id, jobs, cancel).await,
            Scheduling::WorkerPool => self.run_pool(campaign_id, jobs, cancel).await,
        };
        let summary = RunSummary::from_outcomes(run_id, campaign_id, outcomes);

        let status = if summary.is_exhausted() && !self.has_images(campaign_id).await? {
            CampaignStatus::Failed
        } else {
            CampaignStatus::Completed
        };
        self.finalize(campaign_id, run_id, status).await?;

        tracing::info!(
            %run_id,
            campaign_id,
            requested = summary.requested,
            succeeded = summary.succeeded,
            failed = summary.failed,
            status = %status,
            "Generation run finished",
        );
        self.publish(
            CampaignEvent::new(event_types::RUN_FINISHED, campaign_id).with_payload(
                serde_json::json!({
                    "run_id": run_id,
                    "requested": summary.requested,
                    "succeeded": summary.succeeded,
                    "failed": summary.failed,
                    "status": status,
                }),
            ),
        );

        if summary.is_exhausted() {
            return Err(OrchestratorError::BatchExhausted(Box::new(summary)));
        }
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Run lifecycle
    // -----------------------------------------------------------------------

    async fn claim(&self, campaign_id: DbId, run_id: Uuid) -> Result<(), OrchestratorError> {
        let claim = with_deadline(
            self.records
                .begin_run(campaign_id, run_id, self.config.stale_run_after),
            self.config.record_timeout,
            "record.begin_run",
        )
        .await
        .map_err(|e| OrchestratorError::Store(e.to_string()))?;

        match claim {
            RunClaim::Claimed => Ok(()),
            RunClaim::AlreadyRunning => {
                tracing::warn!(campaign_id, "Refusing to start a second concurrent run");
                Err(OrchestratorError::AlreadyRunning { campaign_id })
            }
            RunClaim::AlreadyCompleted => {
                tracing::warn!(campaign_id, "Refusing to re-run a completed campaign");
                Err(OrchestratorError::AlreadyCompleted { campaign_id })
            }
            RunClaim::NotFound => Err(OrchestratorError::NotFound(campaign_id)),
        }
    }

    /// Whether the campaign holds any image record, including ones left by
    /// an earlier run whose claim went stale.
    async fn has_images(&self, campaign_id: DbId) -> Result<bool, OrchestratorError> {
        with_deadline(
            self.records.get_campaign_images(campaign_id),
            self.config.record_timeout,
            "record.get_campaign_images",
        )
        .await
        .map(|images| !images.is_empty())
        .map_err(|e| OrchestratorError::Store(e.to_string()))
    }

    async fn finalize(
        &self,
        campaign_id: DbId,
        run_id: Uuid,
        status: CampaignStatus,
    ) -> Result<(), OrchestratorError> {
        let released = with_deadline(
            self.records.finish_run(campaign_id, run_id, status),
            self.config.record_timeout,
            "record.finish_run",
        )
        .await
        .map_err(|e| {
            tracing::error!(campaign_id, error = %e, "Failed to write terminal campaign status");
            OrchestratorError::Store(e.to_string())
        })?;

        if !released {
            tracing::warn!(
                campaign_id,
                %run_id,
                status = %status,
                "Run claim was taken over, leaving campaign status to the current run",
            );
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Barrier scheduling: wave `i` settles completely before wave `i + 1`
    /// is dispatched.
    async fn run_waves(
        &self,
        campaign_id: DbId,
        jobs: Vec<Job>,
        cancel: &CancellationToken,
    ) -> Vec<JobOutcome> {
        let wave_size = self.config.max_concurrent.max(1);
        let mut outcomes = Vec::with_capacity(jobs.len());
        let mut pending = jobs.into_iter().peekable();
        let mut wave = 0usize;

        while pending.peek().is_some() {
            if cancel.is_cancelled() {
                outcomes.extend(pending.by_ref().map(cancelled));
                break;
            }

            wave += 1;
            let batch: Vec<Job> = pending.by_ref().take(wave_size).collect();
            let size = batch.len();
            let results = join_all(
                batch
                    .into_iter()
                    .map(|job| self.run_job(campaign_id, job, cancel)),
            )
            .await;

            let succeeded = results.iter().filter(|o| o.is_success()).count();
            tracing::debug!(campaign_id, wave, size, succeeded, "Wave settled");
            self.publish(
                CampaignEvent::new(event_types::WAVE_COMPLETED, campaign_id).with_payload(
                    serde_json::json!({ "wave": wave, "size": size, "succeeded": succeeded }),
                ),
            );
            outcomes.extend(results);
        }

        outcomes
    }

    /// Pool scheduling: up to `max_concurrent` jobs in flight, a new one
    /// starting whenever any finishes.
    async fn run_pool(
        &self,
        campaign_id: DbId,
        jobs: Vec<Job>,
        cancel: &CancellationToken,
    ) -> Vec<JobOutcome> {
        stream::iter(jobs)
            .map(move |job| async move {
                if cancel.is_cancelled() {
                    return cancelled(job);
                }
                self.run_job(campaign_id, job, cancel).await
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await
    }

    // -----------------------------------------------------------------------
    // Single job
    // -----------------------------------------------------------------------

    /// Generate, decode, upload, and persist one job.
    ///
    /// Only the generation call is retried. An upload or record failure
    /// after a successful generation fails the whole job.
    async fn run_job(&self, campaign_id: DbId, mut job: Job, cancel: &CancellationToken) -> JobOutcome {
        let request = GenerationRequest {
            prompt: job.prompt_text.clone(),
            width: job.width,
            height: job.height,
        };
        let label = format!("generate job {}", job.index);

        let generated = {
            let request = &request;
            let label = label.as_str();
            let generator = self.generator.as_ref();
            let timeout = self.config.generation_timeout;
            let job_index = job.index;
            with_retry_cancellable(
                move |attempt| async move {
                    tracing::debug!(campaign_id, job_index, attempt, "Generation attempt");
                    with_deadline_cancellable(generator.generate(request), timeout, label, cancel)
                        .await
                },
                self.config.max_attempts,
                linear_backoff(self.config.retry_base_delay),
                label,
                cancel,
            )
            .await
        };

        let payload = match generated {
            Ok(Attempted { value, attempts }) => {
                job.attempt_count = attempts;
                value
            }
            Err(ExhaustedError {
                attempts,
                last_error,
            }) => {
                job.attempt_count = attempts;
                job.last_error = Some(last_error.to_string());
                let reason = generation_failure_reason(last_error);
                return self.fail(campaign_id, &job, reason);
            }
        };

        let bytes = match payload.decode() {
            Ok(bytes) => bytes,
            Err(e) => {
                job.last_error = Some(e.to_string());
                return self.fail(campaign_id, &job, JobFailureReason::InvalidPayload(e.to_string()));
            }
        };

        let content_type = detect_content_type(&bytes);
        let storage_key = image_storage_key(campaign_id, job.format.tag(), Utc::now(), content_type);

        if let Err(e) = with_deadline(
            self.blobs.put(&storage_key, bytes, content_type),
            self.config.upload_timeout,
            "blob.put",
        )
        .await
        {
            job.last_error = Some(e.to_string());
            return self.fail(
                campaign_id,
                &job,
                JobFailureReason::Persistence(format!("upload failed: {e}")),
            );
        }

        let marketing_copy = match job.copy.to_json() {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::warn!(campaign_id, job_index = job.index, error = %e, "Dropping unserializable copy");
                None
            }
        };
        let new_image = NewGeneratedImage {
            campaign_id,
            format: job.format.tag().to_string(),
            prompt_text: job.prompt_text.clone(),
            width: job.width,
            height: job.height,
            storage_key,
            content_type: content_type.to_string(),
            marketing_copy,
        };

        let record = match with_deadline(
            self.records.save_generated_image(&new_image),
            self.config.record_timeout,
            "record.save_generated_image",
        )
        .await
        {
            Ok(record) => record,
            Err(e) => {
                job.last_error = Some(e.to_string());
                return self.fail(
                    campaign_id,
                    &job,
                    JobFailureReason::Persistence(format!("record write failed: {e}")),
                );
            }
        };

        tracing::info!(
            campaign_id,
            job_index = job.index,
            format = %job.format,
            attempts = job.attempt_count,
            image_id = record.id,
            "Job succeeded",
        );
        self.publish(
            CampaignEvent::new(event_types::JOB_SUCCEEDED, campaign_id).with_payload(
                serde_json::json!({
                    "job_index": job.index,
                    "image_id": record.id,
                    "format": job.format,
                    "attempts": job.attempt_count,
                }),
            ),
        );

        JobOutcome::Success {
            job_index: job.index,
            attempts: job.attempt_count,
            record,
        }
    }

    fn fail(&self, campaign_id: DbId, job: &Job, reason: JobFailureReason) -> JobOutcome {
        tracing::warn!(
            campaign_id,
            job_index = job.index,
            format = %job.format,
            attempts = job.attempt_count,
            error = %reason,
            "Job failed",
        );
        self.publish(
            CampaignEvent::new(event_types::JOB_FAILED, campaign_id).with_payload(
                serde_json::json!({
                    "job_index": job.index,
                    "format": job.format,
                    "attempts": job.attempt_count,
                    "reason": &reason,
                }),
            ),
        );
        JobOutcome::Failure(JobFailure {
            job_index: job.index,
            format: job.format,
            attempts: job.attempt_count,
            reason,
        })
    }

    fn publish(&self, event: CampaignEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

/// Failure for a job that was never dispatched.
fn cancelled(job: Job) -> JobOutcome {
    JobOutcome::Failure(JobFailure {
        job_index: job.index,
        format: job.format,
        attempts: job.attempt_count,
        reason: JobFailureReason::Cancelled,
    })
}

fn generation_failure_reason(error: DeadlineError<GenerationError>) -> JobFailureReason {
    match error {
        DeadlineError::Cancelled { .. } => JobFailureReason::Cancelled,
        DeadlineError::Operation(GenerationError::Fatal(message)) => {
            JobFailureReason::GenerationRejected(message)
        }
        other => JobFailureReason::GenerationExhausted(other.to_string()),
    }
}
