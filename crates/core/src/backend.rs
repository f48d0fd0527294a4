//! The generation backend seen from the queue: one opaque async call.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::job::GenerationParams;

/// Location of a finished artifact on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub path: PathBuf,
}

impl ArtifactRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, used when exposing the artifact by name.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Why a generation attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The reference input does not exist.
    #[error("Reference image not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// The reference input exists but cannot be decoded.
    #[error("Reference image is corrupted: {}: {reason}", path.display())]
    InputCorrupt { path: PathBuf, reason: String },

    /// The pipeline itself failed.
    #[error("Failed to generate image: {0}")]
    GenerationFailed(String),
}

impl BackendError {
    /// Input-related failures are the submitter's to fix; the rest are
    /// pipeline faults.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InputNotFound(_) | Self::InputCorrupt { .. })
    }
}

/// A single-capacity generation pipeline.
///
/// Implementations must keep CPU/GPU-bound work off the async scheduler
/// (e.g. `spawn_blocking` or a remote service).
#[async_trait]
pub trait Backend: Send + Sync {
    async fn generate(&self, params: &GenerationParams) -> Result<ArtifactRef, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_are_classified() {
        assert!(BackendError::InputNotFound("/x.png".into()).is_input_error());
        assert!(BackendError::InputCorrupt {
            path: "/x.png".into(),
            reason: "bad header".into()
        }
        .is_input_error());
        assert!(!BackendError::GenerationFailed("oom".into()).is_input_error());
    }

    #[test]
    fn error_display_mentions_path() {
        let err = BackendError::InputNotFound("/refs/cat.png".into());
        assert_eq!(err.to_string(), "Reference image not found: /refs/cat.png");
    }

    #[test]
    fn artifact_file_name() {
        let artifact = ArtifactRef::new("/out/ComfyUI_anime_ab12.png");
        assert_eq!(artifact.file_name(), Some("ComfyUI_anime_ab12.png"));
    }
}
