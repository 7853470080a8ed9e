//! Per-job outcomes and the aggregated run summary.

use adgen_core::campaign::GeneratedImageRecord;
use adgen_core::format::ImageFormat;
use adgen_core::types::DbId;
use serde::Serialize;
use uuid::Uuid;

/// Why a job produced no persisted image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum JobFailureReason {
    /// Every attempt hit a transient error or timeout.
    #[error("generation exhausted: {0}")]
    GenerationExhausted(String),

    /// The backend rejected the request outright.
    #[error("generation rejected: {0}")]
    GenerationRejected(String),

    /// Generation returned data that is not a usable image.
    #[error("invalid image payload: {0}")]
    InvalidPayload(String),

    /// Upload or record write failed after a successful generation.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// The run was cancelled before this job finished.
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFailure {
    pub job_index: usize,
    pub format: ImageFormat,
    /// Generation attempts spent, zero if the job never started.
    pub attempts: u32,
    pub reason: JobFailureReason,
}

/// Terminal result of one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success {
        job_index: usize,
        attempts: u32,
        record: GeneratedImageRecord,
    },
    Failure(JobFailure),
}

impl JobOutcome {
    pub fn job_index(&self) -> usize {
        match self {
            Self::Success { job_index, .. } => *job_index,
            Self::Failure(f) => f.job_index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Aggregate result of one orchestrator run.
///
/// `succeeded + failed == requested` always holds; `images` holds exactly
/// the records this run created, in job order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub campaign_id: DbId,
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<JobFailure>,
    pub images: Vec<GeneratedImageRecord>,
}

impl RunSummary {
    /// Partition outcomes into succeeded and failed, ordered by job index.
    pub fn from_outcomes(run_id: Uuid, campaign_id: DbId, mut outcomes: Vec<JobOutcome>) -> Self {
        outcomes.sort_by_key(JobOutcome::job_index);
        let requested = outcomes.len();

        let mut images = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                JobOutcome::Success { record, .. } => images.push(record),
                JobOutcome::Failure(failure) => failures.push(failure),
            }
        }

        Self {
            run_id,
            campaign_id,
            requested,
            succeeded: images.len(),
            failed: failures.len(),
            failures,
            images,
        }
    }

    /// True when the run produced no usable output.
    pub fn is_exhausted(&self) -> bool {
        self.succeeded == 0
    }

    /// End-user facing result line.
    pub fn user_message(&self) -> String {
        if self.is_exhausted() {
            "No images could be generated, try different preferences".to_string()
        } else {
            format!(
                "{} of {} images generated successfully",
                self.succeeded, self.requested
            )
        }
    }
}
