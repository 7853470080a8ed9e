//! Campaign row model.

use adgen_core::campaign::{Campaign, Preferences};
use adgen_core::error::CoreError;
use adgen_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::status::{CampaignStatusId, StatusId};

/// A row from the `campaigns` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CampaignRow {
    pub id: DbId,
    pub product_id: String,
    /// Preferences snapshot taken when the campaign was created.
    pub preferences: serde_json::Value,
    pub status_id: StatusId,
    pub run_active: bool,
    /// Token of the run holding the claim.
    pub run_id: Option<Uuid>,
    pub run_started_at: Option<Timestamp>,
    pub download_url: Option<String>,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CampaignRow {
    /// Convert into the storage-agnostic domain type.
    pub fn into_domain(self) -> Result<Campaign, CoreError> {
        let status = CampaignStatusId::from_id(self.status_id).ok_or_else(|| {
            CoreError::Internal(format!(
                "Campaign {} has unknown status_id {}",
                self.id, self.status_id
            ))
        })?;
        let preferences: Preferences = serde_json::from_value(self.preferences).map_err(|e| {
            CoreError::Internal(format!(
                "Campaign {} has unreadable preferences: {e}",
                self.id
            ))
        })?;

        Ok(Campaign {
            id: self.id,
            product_id: self.product_id,
            preferences,
            status: status.into(),
            run_active: self.run_active,
            download_url: self.download_url,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
