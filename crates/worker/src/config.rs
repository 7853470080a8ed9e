//! Worker configuration loaded from environment variables.

use std::path::PathBuf;

use adgen_core::error::CoreError;
use adgen_pipeline::PipelineConfig;

/// Connection and collaborator settings for the worker binary.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Directory backing the local blob store.
    pub blob_root: PathBuf,
    /// Prefix for download URLs; `file://` URLs when unset.
    pub blob_public_base_url: Option<String>,
    pub imagegen_api_url: String,
    pub imagegen_api_key: Option<String>,
    pub imagegen_model: Option<String>,
    pub pipeline: PipelineConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                | Default        |
    /// |------------------------|----------------|
    /// | `DATABASE_URL`         | required       |
    /// | `BLOB_ROOT`            | `./data/blobs` |
    /// | `BLOB_PUBLIC_BASE_URL` | unset          |
    /// | `IMAGEGEN_API_URL`     | required       |
    /// | `IMAGEGEN_API_KEY`     | unset          |
    /// | `IMAGEGEN_MODEL`       | unset          |
    ///
    /// Pipeline settings are read as described on [`PipelineConfig::from_env`].
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| {
            optional(name).ok_or_else(|| CoreError::Validation(format!("{name} must be set")))
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            blob_root: optional("BLOB_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/blobs")),
            blob_public_base_url: optional("BLOB_PUBLIC_BASE_URL"),
            imagegen_api_url: required("IMAGEGEN_API_URL")?,
            imagegen_api_key: optional("IMAGEGEN_API_KEY"),
            imagegen_model: optional("IMAGEGEN_MODEL"),
            pipeline: PipelineConfig::from_lookup(&lookup)?,
        })
    }
}
