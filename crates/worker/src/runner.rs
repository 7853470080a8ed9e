//! End-to-end execution of one campaign request.
//!
//! Plans the jobs, creates the campaign, runs generation, and packages
//! every selected image. Generation exhaustion and packaging failures are
//! reported in the [`CampaignReport`] rather than returned as errors.

use adgen_core::campaign::{selected_images, CampaignStatus, Preferences, ProductFacts};
use adgen_core::error::CoreError;
use adgen_core::manifest::ManifestInfo;
use adgen_core::planner::plan;
use adgen_core::services::{RecordStore, StoreError};
use adgen_core::types::DbId;
use adgen_pipeline::{
    ArchiveBuilder, ArchiveResult, JobFailure, Orchestrator, OrchestratorError, RunSummary,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Input file for the worker binary.
#[derive(Debug, Clone, Deserialize)]
pub struct CampaignRequest {
    pub product: ProductFacts,
    pub preferences: Preferences,
    /// Skip packaging when false.
    #[serde(default = "default_package")]
    pub package: bool,
}

fn default_package() -> bool {
    true
}

/// Outcome of one request, printed as JSON by the binary.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignReport {
    pub campaign_id: DbId,
    pub status: CampaignStatus,
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub message: String,
    pub failures: Vec<JobFailure>,
    pub archive: Option<ArchiveResult>,
    pub packaging_error: Option<String>,
}

impl CampaignReport {
    fn from_summary(summary: &RunSummary) -> Self {
        Self {
            campaign_id: summary.campaign_id,
            status: if summary.is_exhausted() {
                CampaignStatus::Failed
            } else {
                CampaignStatus::Completed
            },
            requested: summary.requested,
            succeeded: summary.succeeded,
            failed: summary.failed,
            message: summary.user_message(),
            failures: summary.failures.clone(),
            archive: None,
            packaging_error: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

/// Run one campaign request to completion.
///
/// Invalid preferences are rejected before anything is persisted.
pub async fn run_campaign(
    orchestrator: &Orchestrator,
    archives: &ArchiveBuilder,
    records: &dyn RecordStore,
    request: CampaignRequest,
    cancel: &CancellationToken,
) -> Result<CampaignReport, RunnerError> {
    let jobs = plan(&request.product, &request.preferences)?;
    let campaign = records
        .create_campaign(&request.product.product_id, &request.preferences)
        .await?;
    tracing::info!(
        campaign_id = campaign.id,
        product_id = %request.product.product_id,
        jobs = jobs.len(),
        "Campaign created",
    );

    let summary = match orchestrator.run(campaign.id, jobs, cancel).await {
        Ok(summary) => summary,
        Err(OrchestratorError::BatchExhausted(summary)) => {
            tracing::warn!(campaign_id = campaign.id, "Every generation job failed");
            return Ok(CampaignReport::from_summary(&summary));
        }
        Err(e) => return Err(e.into()),
    };

    let mut report = CampaignReport::from_summary(&summary);
    if !request.package {
        return Ok(report);
    }

    let images = selected_images(records.get_campaign_images(campaign.id).await?);
    let info = ManifestInfo {
        product: request.product,
        preferences: request.preferences,
    };
    match archives.build(campaign.id, &images, &info).await {
        Ok(archive) => report.archive = Some(archive),
        Err(e) => {
            tracing::error!(campaign_id = campaign.id, error = %e, "Packaging failed");
            report.packaging_error = Some(e.to_string());
        }
    }
    Ok(report)
}
