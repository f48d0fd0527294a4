//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`QueueEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use genqueue_core::{Job, JobId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// QueueEvent
// ---------------------------------------------------------------------------

/// Something that happened to a job.
///
/// Constructed via [`QueueEvent::new`] and enriched with
/// [`for_job`](QueueEvent::for_job) and
/// [`with_payload`](QueueEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    /// Dot-separated event name, e.g. `"job.completed"`.
    pub event_type: String,

    pub job_id: Option<JobId>,

    /// User who submitted the job.
    pub requester: Option<String>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl QueueEvent {
    /// Create a new event with only the required `event_type`.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            job_id: None,
            requester: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Attach a job's identity and its usage-relevant parameters.
    pub fn for_job(mut self, job: &Job) -> Self {
        self.job_id = Some(job.id());
        self.requester = Some(job.requester().to_string());
        self.payload = serde_json::json!({
            "model_style": job.parameters().model_style,
            "aspect_ratio": job.parameters().aspect_ratio(),
        });
        self
    }

    /// Merge `payload`'s fields into the event payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        match payload {
            serde_json::Value::Object(extra) if self.payload.is_object() => {
                if let Some(existing) = self.payload.as_object_mut() {
                    existing.extend(extra);
                }
            }
            other => self.payload = other,
        }
        self
    }

    /// String field from the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(serde_json::Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<QueueEvent>,
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
    pub fn publish(&self, event: QueueEvent) {
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use genqueue_core::GenerationParams;

    use super::*;

    fn job() -> Job {
        Job::new(
            "U1",
            None,
            GenerationParams {
                positive_prompt: "p".into(),
                negative_prompt: "n".into(),
                width: 1024,
                height: 768,
                model_style: "anime".into(),
                reference_image_path: PathBuf::from("/r.png"),
                reference_weight: 0.0,
                seed: None,
            },
        )
    }

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let job = job();

        bus.publish(
            QueueEvent::new("job.completed")
                .for_job(&job)
                .with_payload(serde_json::json!({"artifact": "a.png"})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "job.completed");
        assert_eq!(received.job_id, Some(job.id()));
        assert_eq!(received.requester.as_deref(), Some("U1"));
        assert_eq!(received.payload_str("model_style"), Some("anime"));
        assert_eq!(received.payload_str("aspect_ratio"), Some("1024x768"));
        assert_eq!(received.payload_str("artifact"), Some("a.png"));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(QueueEvent::new("job.queued"));

        assert_eq!(rx1.recv().await.unwrap().event_type, "job.queued");
        assert_eq!(rx2.recv().await.unwrap().event_type, "job.queued");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(QueueEvent::new("orphan.event"));
    }

    #[test]
    fn default_event_has_empty_optional_fields() {
        let event = QueueEvent::new("bare.event");
        assert!(event.job_id.is_none());
        assert!(event.requester.is_none());
        assert!(event.payload.is_object());
    }
}
