//! Handler for the `/queue` resource.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use genqueue_core::JobId;
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// One waiting job.
#[derive(Debug, Serialize)]
pub struct PendingEntry {
    pub id: JobId,
    pub requester: String,
    pub model_style: String,
    pub position: usize,
    pub estimated_wait_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct QueueStatus {
    /// Job currently being generated.
    pub active: Option<JobId>,
    pub pending: Vec<PendingEntry>,
}

/// GET /api/v1/queue
///
/// Snapshot of the active job and the pending sequence, front first.
pub async fn queue_status(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let active = state.store.active().await.map(|job| job.id());
    let pending = state
        .store
        .pending_snapshot()
        .await
        .into_iter()
        .enumerate()
        .map(|(index, job)| {
            let position = index + 1;
            PendingEntry {
                id: job.id(),
                requester: job.requester().to_string(),
                model_style: job.parameters().model_style.clone(),
                position,
                estimated_wait_secs: state.store.estimate_wait(position).as_secs(),
            }
        })
        .collect();

    Ok(Json(DataResponse {
        data: QueueStatus { active, pending },
    }))
}
