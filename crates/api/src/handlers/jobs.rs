//! Handlers for the `/jobs` resource: submission and derived actions.

use std::path::PathBuf;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use genqueue_core::derivation::{self, ParameterTemplate};
use genqueue_core::job::parse_aspect_ratio;
use genqueue_core::job_events::EVENT_JOB_QUEUED;
use genqueue_core::messages::{self, SubmissionKind};
use genqueue_core::{CoreError, GenerationParams, Job, JobId, Notification, Target};
use genqueue_events::QueueEvent;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::QueueConfig;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /jobs` and `POST /jobs/remix`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitJobRequest {
    #[validate(length(min = 1, message = "requester must not be empty"))]
    pub requester: String,
    #[serde(default)]
    pub destination: Option<Target>,
    #[validate(length(min = 1, message = "model_style must not be empty"))]
    pub model_style: String,
    #[validate(length(min = 1, message = "positive_prompt must not be empty"))]
    pub positive_prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// `"WxH"`, e.g. `"1024x1024"`.
    pub aspect_ratio: String,
    #[serde(default)]
    pub reference_image_path: Option<PathBuf>,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 0.58, message = "reference_weight must be between 0 and 0.58"))]
    pub reference_weight: Option<f32>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SubmitJobRequest {
    /// Validate and normalise into a new pending job.
    ///
    /// Remixes always use the default reference image.
    pub async fn into_job(self, config: &QueueConfig, kind: SubmissionKind) -> AppResult<Job> {
        self.validate()?;

        let (width, height) = parse_aspect_ratio(&self.aspect_ratio).ok_or_else(|| {
            CoreError::Validation(format!("Invalid aspect ratio: {}", self.aspect_ratio))
        })?;

        let negative_prompt = self
            .negative_prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| config.default_negative_prompt.clone());

        let reference_image_path = match kind {
            SubmissionKind::Remix => config.default_reference_path.clone(),
            _ => resolve_reference(config, self.reference_image_path).await?,
        };

        let params = GenerationParams {
            positive_prompt: self.positive_prompt,
            negative_prompt,
            width,
            height,
            model_style: self.model_style,
            reference_image_path,
            reference_weight: self.reference_weight.unwrap_or(0.0),
            seed: self.seed,
        };

        Ok(Job::new(self.requester, self.destination, params))
    }
}

/// Accept only the default reference or a file stored by `POST /references`.
///
/// Returns the canonical path of an upload.
async fn resolve_reference(config: &QueueConfig, requested: Option<PathBuf>) -> AppResult<PathBuf> {
    let Some(path) = requested else {
        return Ok(config.default_reference_path.clone());
    };
    if path == config.default_reference_path {
        return Ok(path);
    }

    let rejected = || AppError::BadRequest("reference_image_path must be an uploaded reference image".into());
    let temp_dir = tokio::fs::canonicalize(&config.temp_dir)
        .await
        .map_err(|_| rejected())?;
    let resolved = tokio::fs::canonicalize(&path).await.map_err(|_| rejected())?;

    if resolved.parent() == Some(temp_dir.as_path()) {
        Ok(resolved)
    } else {
        tracing::warn!(path = %path.display(), "Rejected reference path outside the upload dir");
        Err(rejected())
    }
}

/// Body of `POST /jobs/{id}/regenerate`.
#[derive(Debug, Deserialize, Validate)]
pub struct RegenerateRequest {
    #[validate(length(min = 1, message = "requester must not be empty"))]
    pub requester: String,
}

/// Optional `?requester=` for `GET /jobs/{id}/remix`, told about failures.
#[derive(Debug, Default, Deserialize)]
pub struct RemixQuery {
    pub requester: Option<String>,
}

/// Where a freshly enqueued job landed.
#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub id: JobId,
    pub position: usize,
    pub estimated_wait_secs: u64,
}

/// A job that is still pending or active.
#[derive(Debug, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    /// 1-based queue position; `None` while active.
    pub position: Option<usize>,
}

/// Remix form defaults.
#[derive(Debug, Serialize)]
pub struct RemixTemplateResponse {
    #[serde(flatten)]
    pub template: ParameterTemplate,
    pub aspect_ratio: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_job_id(raw: &str) -> AppResult<JobId> {
    raw.parse().map_err(|_| AppError::UnknownJob(raw.to_string()))
}

/// Enqueue `job`, announce it and acknowledge the requester.
async fn enqueue(state: &AppState, job: Job, kind: SubmissionKind) -> QueuedResponse {
    let id = job.id();
    let requester = job.requester_target();
    let event = QueueEvent::new(EVENT_JOB_QUEUED).for_job(&job);

    let position = state.store.enqueue(job).await;
    let wait = state.store.estimate_wait(position);
    state.event_bus.publish(event.with_payload(serde_json::json!({ "position": position })));

    tracing::info!(job_id = %id, recipient = %requester, position, kind = ?kind, "Job queued");

    let text = messages::queued(kind, position, wait);
    if let Err(e) = state.notifier.notify(&requester, &Notification::text(text)).await {
        tracing::warn!(job_id = %id, error = %e, "Failed to acknowledge queued job");
    }

    QueuedResponse {
        id,
        position,
        estimated_wait_secs: wait.as_secs(),
    }
}

/// Best-effort failure notice for derived actions.
async fn tell_requester(state: &AppState, requester: &str, text: String) {
    let target = Target::User(requester.to_string());
    if let Err(e) = state.notifier.notify(&target, &Notification::text(text)).await {
        tracing::warn!(recipient = %target, error = %e, "Failed to report action error");
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Submit a new generation request. Returns 201 with its queue position.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    let job = input.into_job(&state.queue_config, SubmissionKind::New).await?;
    let queued = enqueue(&state, job, SubmissionKind::New).await;
    Ok((StatusCode::CREATED, Json(DataResponse { data: queued })))
}

/// POST /api/v1/jobs/remix
///
/// Submit an edited remix. The reference image is always the default.
pub async fn submit_remix(
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    let job = input.into_job(&state.queue_config, SubmissionKind::Remix).await?;
    let queued = enqueue(&state, job, SubmissionKind::Remix).await;
    Ok((StatusCode::CREATED, Json(DataResponse { data: queued })))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// A pending or active job. Finished jobs are gone (404).
pub async fn get_job(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_job_id(&raw_id)?;
    let job = state
        .store
        .find_by_id(id)
        .await
        .ok_or(CoreError::JobNotFound(id))?;
    let position = state.store.position_of(id).await;
    Ok(Json(DataResponse {
        data: JobView { job, position },
    }))
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/regenerate
///
/// Enqueue a copy of a pending or active job for `requester`.
pub async fn regenerate_job(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(input): Json<RegenerateRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let derived = match parse_job_id(&raw_id) {
        Ok(id) => derivation::regenerate_by_id(&state.store, id, input.requester.as_str())
            .await
            .map_err(AppError::from),
        Err(e) => Err(e),
    };

    let job = match derived {
        Ok(job) => job,
        Err(e) => {
            tracing::info!(parent = %raw_id, error = %e, "Regenerate rejected");
            tell_requester(&state, &input.requester, messages::regenerate_failed(&e)).await;
            return Err(e);
        }
    };

    let queued = enqueue(&state, job, SubmissionKind::Regenerate).await;
    Ok((StatusCode::CREATED, Json(DataResponse { data: queued })))
}

/// GET /api/v1/jobs/{id}/remix
///
/// Parameters of a pending or active job, for pre-filling a remix form.
pub async fn remix_template(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(query): Query<RemixQuery>,
) -> AppResult<impl IntoResponse> {
    let template = match parse_job_id(&raw_id) {
        Ok(id) => derivation::remix_by_id(&state.store, id)
            .await
            .map_err(AppError::from),
        Err(e) => Err(e),
    };

    match template {
        Ok(template) => {
            let aspect_ratio = template.parameters.aspect_ratio();
            Ok(Json(DataResponse {
                data: RemixTemplateResponse {
                    template,
                    aspect_ratio,
                },
            }))
        }
        Err(e) => {
            if let Some(requester) = query.requester.as_deref().filter(|r| !r.is_empty()) {
                tell_requester(&state, requester, messages::remix_failed(&e)).await;
            }
            Err(e)
        }
    }
}
