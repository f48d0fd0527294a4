//! Reference image checks.
//!
//! Decoding runs on the blocking pool so a large or malformed upload
//! cannot stall the async scheduler.

use std::path::{Path, PathBuf};

use genqueue_core::BackendError;

/// Whether `filename` carries one of the `allowed` extensions
/// (case-insensitive, without the dot).
pub fn is_allowed_file(filename: &str, allowed: &[String]) -> bool {
    let Some((_, ext)) = filename.rsplit_once('.') else {
        return false;
    };
    allowed.iter().any(|a| a.eq_ignore_ascii_case(ext))
}

/// Confirm `path` exists and decodes as an image.
pub fn verify_image_file(path: &Path) -> Result<(), BackendError> {
    if !path.is_file() {
        return Err(BackendError::InputNotFound(path.to_path_buf()));
    }

    let corrupt = |reason: String| BackendError::InputCorrupt {
        path: path.to_path_buf(),
        reason,
    };

    image::ImageReader::open(path)
        .map_err(|e| corrupt(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| corrupt(e.to_string()))?
        .decode()
        .map_err(|e| corrupt(e.to_string()))?;

    Ok(())
}

/// Async wrapper around [`verify_image_file`].
pub async fn verify_reference_image(path: PathBuf) -> Result<(), BackendError> {
    tokio::task::spawn_blocking(move || verify_image_file(&path))
        .await
        .map_err(|e| BackendError::GenerationFailed(format!("Reference check aborted: {e}")))?
}
