//! Domain core for the campaign image-generation pipeline.
//!
//! Pure types, validation, job planning, prompt rendering, archive
//! manifests, and the deadline/retry primitive shared by every crate
//! that talks to an external collaborator. The collaborator seams
//! themselves ([`services`]) are defined here so that implementations
//! (`adgen-db`, `adgen-storage`, `adgen-imagegen`) and consumers
//! (`adgen-pipeline`) only meet through this crate.

pub mod campaign;
pub mod deadline;
pub mod error;
pub mod format;
pub mod hashing;
pub mod manifest;
pub mod marketing_copy;
pub mod planner;
pub mod prompt;
pub mod services;
pub mod storage;
pub mod types;
