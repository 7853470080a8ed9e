//! Campaign generation pipeline: the generation orchestrator and the
//! archive builder, wired to collaborators through the `adgen-core`
//! service traits.

pub mod archive;
pub mod config;
pub mod orchestrator;
pub mod summary;

pub use archive::{ArchiveBuilder, ArchiveResult, PackagingError};
pub use config::{PipelineConfig, Scheduling};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use summary::{JobFailure, JobFailureReason, JobOutcome, RunSummary};
