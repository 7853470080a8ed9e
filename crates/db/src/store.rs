//! [`RecordStore`] backed by PostgreSQL.

use std::time::Duration;

use adgen_core::campaign::{
    Campaign, CampaignStatus, GeneratedImageRecord, NewGeneratedImage, Preferences,
};
use adgen_core::error::CoreError;
use adgen_core::services::{RecordStore, RunClaim, StoreError};
use adgen_core::types::{DbId, Timestamp};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::status::CampaignStatusId;
use crate::repositories::{CampaignRepo, GeneratedImageRepo};
use crate::DbPool;

/// Upper bound for the stale-run threshold in days; longer values are clamped.
const MAX_STALE_AFTER_DAYS: i64 = 3650;

#[derive(Clone)]
pub struct PgRecordStore {
    pool: DbPool,
}

impl PgRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn conversion(e: CoreError) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn create_campaign(
        &self,
        product_id: &str,
        preferences: &Preferences,
    ) -> Result<Campaign, StoreError> {
        let prefs = serde_json::to_value(preferences)
            .map_err(|e| StoreError::Backend(format!("Cannot serialize preferences: {e}")))?;
        let row = CampaignRepo::create(&self.pool, product_id, &prefs)
            .await
            .map_err(backend)?;
        row.into_domain().map_err(conversion)
    }

    async fn get_campaign(&self, campaign_id: DbId) -> Result<Option<Campaign>, StoreError> {
        CampaignRepo::find_by_id(&self.pool, campaign_id)
            .await
            .map_err(backend)?
            .map(|row| row.into_domain().map_err(conversion))
            .transpose()
    }

    async fn begin_run(
        &self,
        campaign_id: DbId,
        run_id: Uuid,
        stale_after: Duration,
    ) -> Result<RunClaim, StoreError> {
        let max = chrono::Duration::days(MAX_STALE_AFTER_DAYS);
        let window = chrono::Duration::from_std(stale_after)
            .unwrap_or(max)
            .min(max);
        let stale_before = Utc::now() - window;

        let claimed = CampaignRepo::claim_run(&self.pool, campaign_id, run_id, stale_before)
            .await
            .map_err(backend)?;
        if claimed.is_some() {
            return Ok(RunClaim::Claimed);
        }

        let current = CampaignRepo::find_by_id(&self.pool, campaign_id)
            .await
            .map_err(backend)?;
        Ok(match current {
            None => RunClaim::NotFound,
            Some(row) if row.status_id == CampaignStatusId::Completed.id() => {
                RunClaim::AlreadyCompleted
            }
            Some(_) => RunClaim::AlreadyRunning,
        })
    }

    async fn finish_run(
        &self,
        campaign_id: DbId,
        run_id: Uuid,
        status: CampaignStatus,
    ) -> Result<bool, StoreError> {
        let released =
            CampaignRepo::finish_run(&self.pool, campaign_id, run_id, CampaignStatusId::from(status))
                .await
                .map_err(backend)?;
        if released {
            tracing::debug!(campaign_id, %run_id, status = %status, "Run finished");
        }
        Ok(released)
    }

    async fn save_generated_image(
        &self,
        image: &NewGeneratedImage,
    ) -> Result<GeneratedImageRecord, StoreError> {
        let row = GeneratedImageRepo::create(&self.pool, image)
            .await
            .map_err(backend)?;
        row.into_domain().map_err(conversion)
    }

    async fn get_campaign_images(
        &self,
        campaign_id: DbId,
    ) -> Result<Vec<GeneratedImageRecord>, StoreError> {
        GeneratedImageRepo::list_by_campaign(&self.pool, campaign_id)
            .await
            .map_err(backend)?
            .into_iter()
            .map(|row| row.into_domain().map_err(conversion))
            .collect()
    }

    async fn set_image_selected(&self, image_id: DbId, selected: bool) -> Result<(), StoreError> {
        let found = GeneratedImageRepo::set_selected(&self.pool, image_id, selected)
            .await
            .map_err(backend)?;
        if !found {
            return Err(StoreError::NotFound {
                entity: "GeneratedImage",
                id: image_id,
            });
        }
        Ok(())
    }

    async fn attach_archive(
        &self,
        campaign_id: DbId,
        download_url: &str,
        expires_at: Timestamp,
    ) -> Result<bool, StoreError> {
        let attached = CampaignRepo::attach_archive(&self.pool, campaign_id, download_url, expires_at)
            .await
            .map_err(backend)?;
        if attached {
            return Ok(true);
        }

        let exists = CampaignRepo::find_by_id(&self.pool, campaign_id)
            .await
            .map_err(backend)?
            .is_some();
        if !exists {
            return Err(StoreError::NotFound {
                entity: "Campaign",
                id: campaign_id,
            });
        }
        Ok(false)
    }
}
