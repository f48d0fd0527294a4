//! The job value type and its lifecycle states.
//!
//! A [`Job`] is immutable once constructed: its identity, requester,
//! destination and parameters never change. Only the owning
//! [`JobStore`](crate::store::JobStore) may advance its [`JobStatus`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{JobId, Target, Timestamp};

/// Upper bound for the reference-image influence weight.
pub const MAX_REFERENCE_WEIGHT: f32 = 0.58;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a job. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active) | (Self::Active, Self::Completed) | (Self::Active, Self::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Generation parameters forwarded verbatim to the backend.
///
/// The queue never inspects these fields; submission is responsible for
/// validating and normalising them before a job is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    /// Model selector, e.g. `"realistic"` or `"anime"`.
    pub model_style: String,
    pub reference_image_path: PathBuf,
    /// Reference influence, `0.0..=MAX_REFERENCE_WEIGHT`.
    pub reference_weight: f32,
    /// Fixed sampler seed; a random one is drawn when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GenerationParams {
    /// Dimensions rendered the way users pick them, e.g. `"768x1024"`.
    pub fn aspect_ratio(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Parse a `"WxH"` aspect ratio into `(width, height)`.
pub fn parse_aspect_ratio(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.trim().split_once('x')?;
    let width = w.trim().parse().ok()?;
    let height = h.trim().parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    id: JobId,
    requester: String,
    destination: Option<Target>,
    parameters: GenerationParams,
    status: JobStatus,
    created_at: Timestamp,
}

impl Job {
    /// Build a new pending job with a freshly generated id.
    pub fn new(
        requester: impl Into<String>,
        destination: Option<Target>,
        parameters: GenerationParams,
    ) -> Self {
        Self {
            id: JobId::new(),
            requester: requester.into(),
            destination,
            parameters,
            status: JobStatus::Pending,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// User id that receives completion and position notifications.
    pub fn requester(&self) -> &str {
        &self.requester
    }

    /// The requester as a notification target.
    pub fn requester_target(&self) -> Target {
        Target::User(self.requester.clone())
    }

    pub fn destination(&self) -> Option<&Target> {
        self.destination.as_ref()
    }

    /// The destination, if it is a channel distinct from the requester.
    ///
    /// Anything else (a user target, or the requester itself) is not a
    /// valid secondary recipient.
    pub fn deliverable_destination(&self) -> Option<&Target> {
        self.destination
            .as_ref()
            .filter(|t| t.is_channel() && t.id() != self.requester)
    }

    pub fn parameters(&self) -> &GenerationParams {
        &self.parameters
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Advance the status. Illegal transitions are ignored and reported
    /// as `false`.
    pub(crate) fn transition(&mut self, next: JobStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}
