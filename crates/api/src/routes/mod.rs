pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                  WebSocket (?user=..&channel=..)
///
/// /jobs                                submit (POST)
/// /jobs/remix                          submit an edited remix (POST)
/// /jobs/{id}                           get pending/active job
/// /jobs/{id}/regenerate                enqueue a copy (POST)
/// /jobs/{id}/remix                     remix form defaults
///
/// /queue                               pending snapshot + active job
/// /references                          upload a reference image (POST, multipart)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/jobs", post(handlers::jobs::submit_job))
        .route("/jobs/remix", post(handlers::jobs::submit_remix))
        .route("/jobs/{id}", get(handlers::jobs::get_job))
        .route("/jobs/{id}/regenerate", post(handlers::jobs::regenerate_job))
        .route("/jobs/{id}/remix", get(handlers::jobs::remix_template))
        .route("/queue", get(handlers::queue::queue_status))
        .route("/references", post(handlers::references::upload_reference))
}
