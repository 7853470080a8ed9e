//! Repository for the `campaigns` table.

use adgen_core::types::{DbId, Timestamp};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::campaign::CampaignRow;
use crate::models::status::CampaignStatusId;

/// Column list for `campaigns` queries.
const COLUMNS: &str = "\
    id, product_id, preferences, status_id, run_active, run_id, run_started_at, \
    download_url, expires_at, created_at, updated_at";

/// Provides CRUD and run-claim operations for campaigns.
pub struct CampaignRepo;

impl CampaignRepo {
    /// Insert a campaign in `generating` status with no active run.
    pub async fn create(
        pool: &PgPool,
        product_id: &str,
        preferences: &serde_json::Value,
    ) -> Result<CampaignRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO campaigns (product_id, preferences, status_id) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CampaignRow>(&query)
            .bind(product_id)
            .bind(preferences)
            .bind(CampaignStatusId::Generating.id())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<CampaignRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM campaigns WHERE id = $1");
        sqlx::query_as::<_, CampaignRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically take the run claim for `run_id`.
    ///
    /// Matches only when the campaign is not `completed` and either no run
    /// is active or the active run started before `stale_before`. Returns
    /// `None` when the row was not updated, which covers a held claim, a
    /// completed campaign, and a missing campaign.
    pub async fn claim_run(
        pool: &PgPool,
        id: DbId,
        run_id: Uuid,
        stale_before: Timestamp,
    ) -> Result<Option<CampaignRow>, sqlx::Error> {
        let query = format!(
            "UPDATE campaigns \
             SET run_active = TRUE, run_id = $2, run_started_at = NOW(), \
                 status_id = $3, updated_at = NOW() \
             WHERE id = $1 \
               AND status_id <> $5 \
               AND (run_active = FALSE OR run_started_at IS NULL OR run_started_at < $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CampaignRow>(&query)
            .bind(id)
            .bind(run_id)
            .bind(CampaignStatusId::Generating.id())
            .bind(stale_before)
            .bind(CampaignStatusId::Completed.id())
            .fetch_optional(pool)
            .await
    }

    /// Write the terminal status for `run_id` and release its claim.
    ///
    /// Returns `false` if the claim is no longer held by `run_id`.
    pub async fn finish_run(
        pool: &PgPool,
        id: DbId,
        run_id: Uuid,
        status: CampaignStatusId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE campaigns \
             SET status_id = $3, run_active = FALSE, run_id = NULL, updated_at = NOW() \
             WHERE id = $1 AND run_active = TRUE AND run_id = $2",
        )
        .bind(id)
        .bind(run_id)
        .bind(status.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set download fields on a completed campaign with no active run.
    ///
    /// Returns `false` if no row matched.
    pub async fn attach_archive(
        pool: &PgPool,
        id: DbId,
        download_url: &str,
        expires_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE campaigns \
             SET download_url = $2, expires_at = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id = $4 AND run_active = FALSE",
        )
        .bind(id)
        .bind(download_url)
        .bind(expires_at)
        .bind(CampaignStatusId::Completed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
