//! Repository for the `generated_images` table.

use adgen_core::campaign::NewGeneratedImage;
use adgen_core::types::DbId;
use sqlx::PgPool;

use crate::models::generated_image::GeneratedImageRow;

/// Column list for `generated_images` queries.
const COLUMNS: &str = "\
    id, campaign_id, format, prompt_text, width, height, storage_key, \
    content_type, selected, marketing_copy, created_at";

pub struct GeneratedImageRepo;

impl GeneratedImageRepo {
    /// Insert a generated image. New rows are always selected.
    pub async fn create(
        pool: &PgPool,
        input: &NewGeneratedImage,
    ) -> Result<GeneratedImageRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO generated_images \
                 (campaign_id, format, prompt_text, width, height, storage_key, \
                  content_type, selected, marketing_copy) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedImageRow>(&query)
            .bind(input.campaign_id)
            .bind(&input.format)
            .bind(&input.prompt_text)
            .bind(input.width as i32)
            .bind(input.height as i32)
            .bind(&input.storage_key)
            .bind(&input.content_type)
            .bind(&input.marketing_copy)
            .fetch_one(pool)
            .await
    }

    /// All images of a campaign in insertion order.
    pub async fn list_by_campaign(
        pool: &PgPool,
        campaign_id: DbId,
    ) -> Result<Vec<GeneratedImageRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generated_images \
             WHERE campaign_id = $1 \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, GeneratedImageRow>(&query)
            .bind(campaign_id)
            .fetch_all(pool)
            .await
    }

    /// Toggle selection. Returns `false` if the image does not exist.
    pub async fn set_selected(
        pool: &PgPool,
        id: DbId,
        selected: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE generated_images SET selected = $2 WHERE id = $1")
            .bind(id)
            .bind(selected)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
