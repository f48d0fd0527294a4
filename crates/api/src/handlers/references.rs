//! Reference image uploads.

use std::path::{Path, PathBuf};

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use genqueue_comfyui::reference::{is_allowed_file, verify_reference_image};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StoredReference {
    /// Pass as `reference_image_path` when submitting a job.
    pub path: PathBuf,
}

/// Temp-dir file name for an upload: `<unix-ts>_<base name>`.
pub fn stored_file_name(original: &str, unix_ts: i64) -> Option<String> {
    let base = Path::new(original).file_name()?.to_str()?;
    Some(format!("{unix_ts}_{base}"))
}

/// POST /api/v1/references
///
/// Multipart upload with a single `file` field. The image must carry an
/// allowed extension and decode cleanly.
pub async fn upload_reference(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let config = &state.queue_config;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("Upload is missing a file name".into()))?;
        if !is_allowed_file(&original, &config.allowed_extensions) {
            return Err(AppError::BadRequest(format!(
                "Unsupported file type. Allowed: {}",
                config.allowed_extensions.join(", ")
            )));
        }
        let name = stored_file_name(&original, chrono::Utc::now().timestamp())
            .ok_or_else(|| AppError::BadRequest(format!("Invalid file name: {original}")))?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;

        tokio::fs::create_dir_all(&config.temp_dir)
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to create temp dir: {e}")))?;
        let path = config.temp_dir.join(name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to store upload: {e}")))?;

        if let Err(e) = verify_reference_image(path.clone()).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(AppError::BadRequest(format!("Uploaded file is not a valid image: {e}")));
        }

        tracing::info!(path = %path.display(), size = bytes.len(), "Reference image stored");
        return Ok((StatusCode::CREATED, Json(DataResponse { data: StoredReference { path } })));
    }

    Err(AppError::BadRequest("Missing 'file' field".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_name_strips_directories() {
        assert_eq!(
            stored_file_name("../../etc/cat.png", 1700000000).as_deref(),
            Some("1700000000_cat.png")
        );
        assert_eq!(stored_file_name("..", 1), None);
    }
}
