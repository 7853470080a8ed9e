//! Generated image row model.

use adgen_core::campaign::GeneratedImageRecord;
use adgen_core::error::CoreError;
use adgen_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `generated_images` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GeneratedImageRow {
    pub id: DbId,
    pub campaign_id: DbId,
    pub format: String,
    pub prompt_text: String,
    pub width: i32,
    pub height: i32,
    pub storage_key: String,
    pub content_type: String,
    pub selected: bool,
    pub marketing_copy: Option<String>,
    pub created_at: Timestamp,
}

impl GeneratedImageRow {
    pub fn into_domain(self) -> Result<GeneratedImageRecord, CoreError> {
        let width = dimension(self.id, "width", self.width)?;
        let height = dimension(self.id, "height", self.height)?;
        Ok(GeneratedImageRecord {
            id: self.id,
            campaign_id: self.campaign_id,
            format: self.format,
            prompt_text: self.prompt_text,
            width,
            height,
            storage_key: self.storage_key,
            content_type: self.content_type,
            selected: self.selected,
            marketing_copy: self.marketing_copy,
            created_at: self.created_at,
        })
    }
}

fn dimension(id: DbId, field: &str, value: i32) -> Result<u32, CoreError> {
    u32::try_from(value).map_err(|_| {
        CoreError::Internal(format!("Generated image {id} has negative {field} {value}"))
    })
}
