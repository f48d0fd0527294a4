//! JSON wire form of a [`Notification`].

use std::path::Path;

use genqueue_core::job_events::MSG_TYPE_NOTIFICATION;
use genqueue_core::{Notification, Target};
use serde::Serialize;

/// Maps artifact paths to public URLs under `{base_url}/artifacts/`.
#[derive(Debug, Clone)]
pub struct ArtifactLinks {
    base_url: String,
}

impl ArtifactLinks {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// Link for `path`, or `None` when the path has no usable file name.
    pub fn link_for(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        Some(format!("{}/artifacts/{name}", self.base_url))
    }
}

#[derive(Debug, Serialize)]
struct ActionPayload<'a> {
    kind: genqueue_core::ActionKind,
    job_id: genqueue_core::JobId,
    label: &'a str,
}

#[derive(Debug, Serialize)]
struct NotificationPayload<'a> {
    #[serde(rename = "type")]
    message_type: &'static str,
    target: &'a Target,
    text: &'a str,
    attachments: Vec<String>,
    actions: Vec<ActionPayload<'a>>,
}

/// Serialise `notification` for `target`.
///
/// Returns the JSON value together with the link of the first attachment,
/// which becomes the delivery receipt.
pub fn build_payload(
    links: &ArtifactLinks,
    target: &Target,
    notification: &Notification,
) -> (serde_json::Value, Option<String>) {
    let attachments: Vec<String> = notification
        .attachments
        .iter()
        .filter_map(|path| links.link_for(path))
        .collect();
    let first_link = attachments.first().cloned();

    let payload = NotificationPayload {
        message_type: MSG_TYPE_NOTIFICATION,
        target,
        text: &notification.text,
        attachments,
        actions: notification
            .actions
            .iter()
            .map(|action| ActionPayload {
                kind: action.kind,
                job_id: action.job_id,
                label: action.kind.label(),
            })
            .collect(),
    };

    let value = serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null);
    (value, first_link)
}
