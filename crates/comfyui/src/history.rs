//! Interpretation of `GET /history/{prompt_id}` responses.

use serde::Deserialize;
use serde_json::Value;

/// One image reported by an output node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Where a prompt stands according to its history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptState {
    /// No history entry yet: still queued or running.
    Running,
    /// Finished; images are listed in node-id order (possibly empty).
    Completed(Vec<OutputImage>),
    /// Execution ended with an error.
    Failed(String),
}

/// Read the state of `prompt_id` out of a history response body.
pub fn prompt_state(history: &Value, prompt_id: &str) -> PromptState {
    let Some(entry) = history.get(prompt_id) else {
        return PromptState::Running;
    };

    let status = entry.get("status");
    let status_str = status
        .and_then(|s| s.get("status_str"))
        .and_then(Value::as_str);

    if status_str == Some("error") {
        return PromptState::Failed(error_message(status));
    }

    let completed = status
        .and_then(|s| s.get("completed"))
        .and_then(Value::as_bool)
        // Older servers omit `status` entirely once outputs are written.
        .unwrap_or(true);
    if !completed {
        return PromptState::Running;
    }

    PromptState::Completed(collect_images(entry.get("outputs")))
}

fn collect_images(outputs: Option<&Value>) -> Vec<OutputImage> {
    let Some(outputs) = outputs.and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut node_ids: Vec<&String> = outputs.keys().collect();
    node_ids.sort_by_key(|id| id.parse::<u64>().unwrap_or(u64::MAX));

    node_ids
        .into_iter()
        .filter_map(|id| outputs[id].get("images"))
        .filter_map(|images| serde_json::from_value::<Vec<OutputImage>>(images.clone()).ok())
        .flatten()
        .collect()
}

/// Pull the most useful error text out of a failed status block.
fn error_message(status: Option<&Value>) -> String {
    status
        .and_then(|s| s.get("messages"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find_map(|msg| {
            // Messages are `[kind, details]` pairs.
            let kind = msg.get(0).and_then(Value::as_str)?;
            if kind != "execution_error" {
                return None;
            }
            msg.get(1)
                .and_then(|d| d.get("exception_message"))
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
        })
        .unwrap_or_else(|| "ComfyUI reported an execution error".to_string())
}
