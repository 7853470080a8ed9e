//! Campaign progress event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`CampaignEvent`]: the event envelope published by the generation
//!   orchestrator and the archive builder.

pub mod bus;

pub use bus::{event_types, CampaignEvent, EventBus};
