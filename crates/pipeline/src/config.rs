//! Pipeline tuning loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use adgen_core::error::CoreError;

/// How generation jobs are dispatched within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheduling {
    /// Consecutive waves of `max_concurrent` jobs; a wave fully settles
    /// before the next one starts.
    #[default]
    Waves,
    /// A bounded pool of `max_concurrent` slots; a new job starts as soon
    /// as any slot frees up.
    WorkerPool,
}

impl Scheduling {
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "waves" | "wave" => Ok(Self::Waves),
            "pool" | "worker_pool" => Ok(Self::WorkerPool),
            other => Err(CoreError::Validation(format!(
                "GENERATION_SCHEDULING must be 'waves' or 'pool', got '{other}'"
            ))),
        }
    }
}

/// Concurrency, deadline, and retry settings for a pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on simultaneous generation calls.
    pub max_concurrent: usize,
    /// Deadline for one generation attempt.
    pub generation_timeout: Duration,
    /// Total attempts per job, including the first.
    pub max_attempts: u32,
    /// Backoff before attempt `n + 1` is `n * retry_base_delay`.
    pub retry_base_delay: Duration,
    pub scheduling: Scheduling,
    /// Deadline for one blob upload.
    pub upload_timeout: Duration,
    /// Deadline for one record-store call.
    pub record_timeout: Duration,
    /// Deadline for fetching, packing, and uploading one archive.
    pub archive_timeout: Duration,
    /// How long an archive download link stays valid.
    pub archive_expiry_hours: u32,
    /// A run claim older than this is treated as abandoned.
    pub stale_run_after: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            generation_timeout: Duration::from_secs(90),
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1000),
            scheduling: Scheduling::Waves,
            upload_timeout: Duration::from_secs(30),
            record_timeout: Duration::from_secs(10),
            archive_timeout: Duration::from_secs(120),
            archive_expiry_hours: 24,
            stale_run_after: Duration::from_secs(3600),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default |
    /// |----------------------------------|---------|
    /// | `GENERATION_MAX_CONCURRENT`      | `4`     |
    /// | `GENERATION_TIMEOUT_SECS`        | `90`    |
    /// | `GENERATION_MAX_ATTEMPTS`        | `3`     |
    /// | `GENERATION_RETRY_BASE_DELAY_MS` | `1000`  |
    /// | `GENERATION_SCHEDULING`          | `waves` |
    /// | `UPLOAD_TIMEOUT_SECS`            | `30`    |
    /// | `RECORD_TIMEOUT_SECS`            | `10`    |
    /// | `ARCHIVE_TIMEOUT_SECS`           | `120`   |
    /// | `ARCHIVE_EXPIRY_HOURS`           | `24`    |
    /// | `STALE_RUN_AFTER_SECS`           | `3600`  |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let defaults = Self::default();

        let max_concurrent: usize = parse_var(&lookup, "GENERATION_MAX_CONCURRENT", 4)?;
        let max_attempts: u32 = parse_var(&lookup, "GENERATION_MAX_ATTEMPTS", 3)?;
        let scheduling = match lookup("GENERATION_SCHEDULING") {
            Some(value) => Scheduling::from_name(&value)?,
            None => defaults.scheduling,
        };

        let config = Self {
            max_concurrent,
            generation_timeout: secs(&lookup, "GENERATION_TIMEOUT_SECS", 90)?,
            max_attempts,
            retry_base_delay: Duration::from_millis(parse_var(
                &lookup,
                "GENERATION_RETRY_BASE_DELAY_MS",
                1000,
            )?),
            scheduling,
            upload_timeout: secs(&lookup, "UPLOAD_TIMEOUT_SECS", 30)?,
            record_timeout: secs(&lookup, "RECORD_TIMEOUT_SECS", 10)?,
            archive_timeout: secs(&lookup, "ARCHIVE_TIMEOUT_SECS", 120)?,
            archive_expiry_hours: parse_var(&lookup, "ARCHIVE_EXPIRY_HOURS", 24)?,
            stale_run_after: secs(&lookup, "STALE_RUN_AFTER_SECS", 3600)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall or disable the pipeline.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_concurrent == 0 {
            return Err(CoreError::Validation(
                "GENERATION_MAX_CONCURRENT must be at least 1".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(CoreError::Validation(
                "GENERATION_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("GENERATION_TIMEOUT_SECS", self.generation_timeout),
            ("UPLOAD_TIMEOUT_SECS", self.upload_timeout),
            ("RECORD_TIMEOUT_SECS", self.record_timeout),
            ("ARCHIVE_TIMEOUT_SECS", self.archive_timeout),
        ] {
            if value.is_zero() {
                return Err(CoreError::Validation(format!("{name} must be positive")));
            }
        }
        if self.archive_expiry_hours == 0 {
            return Err(CoreError::Validation(
                "ARCHIVE_EXPIRY_HOURS must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, CoreError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            CoreError::Validation(format!("{name} has invalid value '{raw}'"))
        }),
    }
}

fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
) -> Result<Duration, CoreError> {
    parse_var(lookup, name, default).map(Duration::from_secs)
}
