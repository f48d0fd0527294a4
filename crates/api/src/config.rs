use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use genqueue_comfyui::ComfyUIConfig;
use genqueue_core::Target;

/// A malformed environment variable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a valid {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Read `key`, falling back to `default` when unset.
fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

/// Read and parse `key`, falling back to `default` when unset.
fn parse_var<T: FromStr>(key: &'static str, default: &str, expected: &'static str) -> Result<T, ConfigError> {
    let value = var_or(key, default);
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        expected,
        value,
    })
}

/// Split a comma-separated list, dropping empty entries.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `"name=checkpoint,name=checkpoint"`.
pub fn parse_models(value: &str) -> Result<HashMap<String, String>, ConfigError> {
    parse_list(value)
        .into_iter()
        .map(|entry| match entry.split_once('=') {
            Some((name, checkpoint)) if !name.trim().is_empty() && !checkpoint.trim().is_empty() => {
                Ok((name.trim().to_string(), checkpoint.trim().to_string()))
            }
            _ => Err(ConfigError::Invalid {
                key: "COMFYUI_MODELS",
                expected: "list of name=checkpoint pairs",
                value: value.to_string(),
            }),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// HTTP server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Budget for draining background tasks on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: var_or("HOST", "0.0.0.0"),
            port: parse_var("PORT", "3000", "u16")?,
            cors_origins: parse_list(&var_or("CORS_ORIGINS", "http://localhost:5173")),
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", "30", "u64")?,
            shutdown_timeout_secs: parse_var("SHUTDOWN_TIMEOUT_SECS", "30", "u64")?,
        })
    }
}

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

/// Submission defaults, storage locations and delivery settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Expected duration of one generation; drives wait estimates.
    pub per_job_duration: Duration,
    /// Substituted when a submission leaves the negative prompt empty.
    pub default_negative_prompt: String,
    /// Reference image used when none is uploaded, and for every remix.
    pub default_reference_path: PathBuf,
    /// Accepted reference upload extensions, lowercase without dot.
    pub allowed_extensions: Vec<String>,
    /// Where uploaded references are stored.
    pub temp_dir: PathBuf,
    /// Uploads older than this are removed by the cleanup task.
    pub temp_max_age: Duration,
    /// Externally reachable base URL used to build artifact links.
    pub public_base_url: String,
    /// When set, notifications go to this webhook instead of WebSockets.
    pub notify_webhook_url: Option<String>,
    /// Channel receiving periodic usage reports.
    pub report_target: Option<Target>,
}

impl QueueConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                          |
    /// |-----------------------------|----------------------------------|
    /// | `ESTIMATED_GENERATION_SECS` | `60`                             |
    /// | `DEFAULT_NEGATIVE_PROMPT`   | `blurry, low quality, distorted` |
    /// | `DEFAULT_REFERENCE_PATH`    | `./assets/default_reference.png` |
    /// | `ALLOWED_EXTENSIONS`        | `jpg,jpeg,png,webp`              |
    /// | `TEMP_DIR`                  | `./temp`                         |
    /// | `TEMP_MAX_AGE_SECS`         | `3600`                           |
    /// | `PUBLIC_BASE_URL`           | `http://localhost:3000`          |
    /// | `NOTIFY_WEBHOOK_URL`        | unset                            |
    /// | `REPORT_TARGET`             | unset                            |
    pub fn from_env() -> Result<Self, ConfigError> {
        let optional = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            per_job_duration: Duration::from_secs(parse_var("ESTIMATED_GENERATION_SECS", "60", "u64")?),
            default_negative_prompt: var_or("DEFAULT_NEGATIVE_PROMPT", "blurry, low quality, distorted"),
            default_reference_path: var_or("DEFAULT_REFERENCE_PATH", "./assets/default_reference.png").into(),
            allowed_extensions: parse_list(&var_or("ALLOWED_EXTENSIONS", "jpg,jpeg,png,webp"))
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            temp_dir: var_or("TEMP_DIR", "./temp").into(),
            temp_max_age: Duration::from_secs(parse_var("TEMP_MAX_AGE_SECS", "3600", "u64")?),
            public_base_url: var_or("PUBLIC_BASE_URL", "http://localhost:3000"),
            notify_webhook_url: optional("NOTIFY_WEBHOOK_URL"),
            report_target: optional("REPORT_TARGET").map(Target::Channel),
        })
    }
}

// ---------------------------------------------------------------------------
// ComfyUI
// ---------------------------------------------------------------------------

/// Load the ComfyUI backend configuration.
///
/// | Env Var                    | Default                                                                     |
/// |----------------------------|-----------------------------------------------------------------------------|
/// | `COMFYUI_API_URL`          | `http://127.0.0.1:8188`                                                     |
/// | `COMFYUI_OUTPUT_DIR`       | `./output`                                                                  |
/// | `COMFYUI_MODELS`           | `realistic=realistic.safetensors,anime=anime.safetensors,korean=korean.safetensors` |
/// | `COMFYUI_POLL_INTERVAL_MS` | `1000`                                                                      |
/// | `COMFYUI_GENERATION_TIMEOUT_SECS` | `600`                                                                |
pub fn comfyui_from_env() -> Result<ComfyUIConfig, ConfigError> {
    Ok(ComfyUIConfig {
        api_url: var_or("COMFYUI_API_URL", "http://127.0.0.1:8188"),
        output_dir: var_or("COMFYUI_OUTPUT_DIR", "./output").into(),
        models: parse_models(&var_or(
            "COMFYUI_MODELS",
            "realistic=realistic.safetensors,anime=anime.safetensors,korean=korean.safetensors",
        ))?,
        poll_interval: Duration::from_millis(parse_var("COMFYUI_POLL_INTERVAL_MS", "1000", "u64")?),
        generation_timeout: Duration::from_secs(parse_var("COMFYUI_GENERATION_TIMEOUT_SECS", "600", "u64")?),
    })
}
