//! Regenerate and remix: new work derived from an existing job.
//!
//! Both actions only work while the parent is still pending or active;
//! once the dispatcher completes a job it is evicted and lookups fail
//! with [`CoreError::JobNotFound`].

use serde::Serialize;

use crate::error::CoreError;
use crate::job::{GenerationParams, Job};
use crate::store::JobStore;
use crate::types::JobId;

/// Pre-filled defaults for a parameter-editing form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterTemplate {
    /// Job the template was taken from.
    pub parent_id: JobId,
    pub parameters: GenerationParams,
}

/// Build a copy of `parent` owned by `requester`.
///
/// Parameters and destination are copied verbatim; the id is new.
pub fn regenerate(parent: &Job, requester: impl Into<String>) -> Job {
    Job::new(
        requester,
        parent.destination().cloned(),
        parent.parameters().clone(),
    )
}

/// Expose `parent`'s parameters for editing. Nothing is enqueued.
pub fn remix(parent: &Job) -> ParameterTemplate {
    ParameterTemplate {
        parent_id: parent.id(),
        parameters: parent.parameters().clone(),
    }
}

/// Look up `parent_id` and derive a regenerated job from it.
///
/// The caller enqueues the result.
pub async fn regenerate_by_id(
    store: &JobStore,
    parent_id: JobId,
    requester: impl Into<String>,
) -> Result<Job, CoreError> {
    let parent = store
        .find_by_id(parent_id)
        .await
        .ok_or(CoreError::JobNotFound(parent_id))?;
    Ok(regenerate(&parent, requester))
}

/// Look up `parent_id` and return its parameters as a remix template.
pub async fn remix_by_id(store: &JobStore, parent_id: JobId) -> Result<ParameterTemplate, CoreError> {
    let parent = store
        .find_by_id(parent_id)
        .await
        .ok_or(CoreError::JobNotFound(parent_id))?;
    Ok(remix(&parent))
}
