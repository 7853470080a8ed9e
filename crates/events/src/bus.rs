//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`CampaignEvent`]s. It is
//! shared via `Arc<EventBus>`; publishing never blocks and never fails.

use adgen_core::types::{DbId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Dot-separated event names published by the pipeline.
pub mod event_types {
    pub const RUN_STARTED: &str = "campaign.run.started";
    pub const JOB_SUCCEEDED: &str = "campaign.job.succeeded";
    pub const JOB_FAILED: &str = "campaign.job.failed";
    pub const WAVE_COMPLETED: &str = "campaign.wave.completed";
    pub const RUN_FINISHED: &str = "campaign.run.finished";
    pub const ARCHIVE_READY: &str = "campaign.archive.ready";
}

// ---------------------------------------------------------------------------
// CampaignEvent
// ---------------------------------------------------------------------------

/// Something that happened to a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignEvent {
    /// Dot-separated event name, e.g. `"campaign.job.failed"`.
    pub event_type: String,

    pub campaign_id: DbId,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: Timestamp,
}

impl CampaignEvent {
    /// Create an event with an empty payload.
    pub fn new(event_type: impl Into<String>, campaign_id: DbId) -> Self {
        Self {
            event_type: event_type.into(),
            campaign_id,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use adgen_events::bus::{CampaignEvent, EventBus};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(CampaignEvent::new("campaign.run.started", 1));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<CampaignEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: CampaignEvent) {
        tracing::trace!(event_type = %event.event_type, campaign_id = event.campaign_id, "Publishing event");
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<CampaignEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
