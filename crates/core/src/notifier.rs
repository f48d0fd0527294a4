//! Client-facing notification delivery, as consumed by the dispatcher and
//! request handlers.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{JobId, Target};

/// Follow-up actions offered alongside a finished artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Regenerate,
    Remix,
}

impl ActionKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Regenerate => "Regenerate",
            Self::Remix => "Remix",
        }
    }
}

/// An action button carrying the id of the job it derives from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub job_id: JobId,
}

impl Action {
    /// The fixed affordance attached to every delivered artifact.
    pub fn for_job(job_id: JobId) -> Vec<Action> {
        vec![
            Action {
                kind: ActionKind::Regenerate,
                job_id,
            },
            Action {
                kind: ActionKind::Remix,
                job_id,
            },
        ]
    }
}

/// One message to a target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notification {
    pub text: String,
    pub attachments: Vec<PathBuf>,
    pub actions: Vec<Action>,
}

impl Notification {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }
}

/// What a successful delivery produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Shareable link to the first delivered attachment, if any.
    pub link: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Nobody is listening on the target.
    #[error("Target {0} is not reachable")]
    Undeliverable(Target),

    /// The transport failed.
    #[error("Notification transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        target: &Target,
        notification: &Notification,
    ) -> Result<DeliveryReceipt, NotifyError>;
}
