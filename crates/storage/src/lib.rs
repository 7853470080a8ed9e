//! Blob storage backends.

pub mod local;

pub use local::LocalBlobStore;
