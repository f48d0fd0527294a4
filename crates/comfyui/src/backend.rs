//! [`Backend`] implementation on top of a single ComfyUI instance.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use genqueue_core::{ArtifactRef, Backend, BackendError, GenerationParams};

use crate::api::ComfyUIApi;
use crate::history::{prompt_state, OutputImage, PromptState};
use crate::output::{latest_file_with_prefix, output_path};
use crate::reference::verify_reference_image;
use crate::workflow::{build_workflow, output_prefix, random_seed};

/// Consecutive history-poll failures tolerated before giving up.
const MAX_POLL_ERRORS: u32 = 5;

/// Connection and model settings for a ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIConfig {
    /// Base HTTP URL, e.g. `http://127.0.0.1:8188`.
    pub api_url: String,
    /// ComfyUI's output directory as seen from this process.
    pub output_dir: PathBuf,
    /// Model selector to checkpoint file name.
    pub models: HashMap<String, String>,
    /// Delay between history polls while a prompt runs.
    pub poll_interval: Duration,
    /// Upper bound on how long one prompt may take once submitted.
    pub generation_timeout: Duration,
}

impl ComfyUIConfig {
    pub fn checkpoint_for(&self, model_style: &str) -> Option<&str> {
        self.models.get(model_style).map(String::as_str)
    }
}

/// Generates images by driving a ComfyUI server over HTTP.
pub struct ComfyUIBackend {
    api: ComfyUIApi,
    config: ComfyUIConfig,
    client_id: String,
}

impl ComfyUIBackend {
    pub fn new(config: ComfyUIConfig) -> Self {
        Self {
            api: ComfyUIApi::new(config.api_url.clone()),
            client_id: uuid::Uuid::new_v4().to_string(),
            config,
        }
    }

    pub fn config(&self) -> &ComfyUIConfig {
        &self.config
    }

    /// Poll history until the prompt finishes.
    async fn wait_for_completion(&self, prompt_id: &str) -> Result<Vec<OutputImage>, BackendError> {
        let mut errors = 0u32;

        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            let history = match self.api.get_history(prompt_id).await {
                Ok(history) => {
                    errors = 0;
                    history
                }
                Err(e) => {
                    errors += 1;
                    tracing::warn!(prompt_id, attempt = errors, error = %e, "History poll failed");
                    if errors >= MAX_POLL_ERRORS {
                        return Err(BackendError::GenerationFailed(format!(
                            "Lost contact with ComfyUI: {e}"
                        )));
                    }
                    continue;
                }
            };

            match prompt_state(&history, prompt_id) {
                PromptState::Running => continue,
                PromptState::Completed(images) => return Ok(images),
                PromptState::Failed(message) => {
                    return Err(BackendError::GenerationFailed(message));
                }
            }
        }
    }

    /// Map the reported images to a file on disk, falling back to the
    /// newest file carrying our prefix.
    async fn resolve_artifact(
        &self,
        images: &[OutputImage],
        prefix: &str,
    ) -> Result<ArtifactRef, BackendError> {
        if let Some(image) = images.first() {
            let path = output_path(&self.config.output_dir, image);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(ArtifactRef::new(path));
            }
            tracing::warn!(path = %path.display(), "Reported output missing, scanning output dir");
        }

        let dir = self.config.output_dir.clone();
        let owned_prefix = prefix.to_string();
        let found = tokio::task::spawn_blocking(move || latest_file_with_prefix(&dir, &owned_prefix))
            .await
            .map_err(|e| BackendError::GenerationFailed(format!("Output scan aborted: {e}")))?
            .map_err(|e| BackendError::GenerationFailed(format!("Output scan failed: {e}")))?;

        found.map(ArtifactRef::new).ok_or_else(|| {
            BackendError::GenerationFailed(format!(
                "No files found with prefix '{prefix}' in directory '{}'",
                self.config.output_dir.display()
            ))
        })
    }
}

#[async_trait]
impl Backend for ComfyUIBackend {
    async fn generate(&self, params: &GenerationParams) -> Result<ArtifactRef, BackendError> {
        tracing::info!(
            model_style = %params.model_style,
            width = params.width,
            height = params.height,
            reference = %params.reference_image_path.display(),
            "Starting image generation",
        );

        verify_reference_image(params.reference_image_path.clone()).await?;

        let checkpoint = self
            .config
            .checkpoint_for(&params.model_style)
            .ok_or_else(|| {
                BackendError::GenerationFailed(format!("Invalid model style: {}", params.model_style))
            })?;

        let prefix = output_prefix(&params.model_style);
        let seed = params.seed.unwrap_or_else(random_seed);
        let workflow = build_workflow(params, checkpoint, seed, &prefix);

        let submitted = self
            .api
            .submit_workflow(&workflow, &self.client_id)
            .await
            .map_err(|e| BackendError::GenerationFailed(format!("ComfyUI submission failed: {e}")))?;

        tracing::info!(prompt_id = %submitted.prompt_id, seed, "Workflow submitted to ComfyUI");

        let images = tokio::time::timeout(
            self.config.generation_timeout,
            self.wait_for_completion(&submitted.prompt_id),
        )
        .await
        .map_err(|_| {
            tracing::error!(prompt_id = %submitted.prompt_id, "Prompt did not finish in time");
            BackendError::GenerationFailed(format!(
                "ComfyUI did not finish prompt {} within {:?}",
                submitted.prompt_id, self.config.generation_timeout
            ))
        })??;
        let artifact = self.resolve_artifact(&images, &prefix).await?;

        tracing::info!(
            prompt_id = %submitted.prompt_id,
            path = %artifact.path().display(),
            "Image generation completed",
        );
        Ok(artifact)
    }
}
