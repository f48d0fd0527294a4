//! Event type names and WebSocket message types for job lifecycle events.

/// A job entered the pending sequence.
pub const EVENT_JOB_QUEUED: &str = "job.queued";

/// A job moved into the active slot.
pub const EVENT_JOB_STARTED: &str = "job.started";

/// A job produced an artifact.
pub const EVENT_JOB_COMPLETED: &str = "job.completed";

/// A job ended without an artifact.
pub const EVENT_JOB_FAILED: &str = "job.failed";

/// WebSocket frame type for a delivered notification.
pub const MSG_TYPE_NOTIFICATION: &str = "notification";
