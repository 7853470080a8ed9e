//! HTTP client for the external image-generation API.

pub mod api;

pub use api::HttpImageGenerator;
