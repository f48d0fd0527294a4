//! Core domain types and queue logic for genqueue.
//!
//! This crate owns the job model, the concurrency-safe [`JobStore`], the
//! regenerate/remix derivation rules and the collaborator traits
//! ([`Backend`], [`Notifier`]) that the dispatcher drives. It performs no
//! network or filesystem I/O itself.

pub mod backend;
pub mod derivation;
pub mod error;
pub mod job;
pub mod job_events;
pub mod messages;
pub mod notifier;
pub mod store;
pub mod types;

pub use backend::{ArtifactRef, Backend, BackendError};
pub use error::CoreError;
pub use job::{GenerationParams, Job, JobStatus};
pub use notifier::{Action, ActionKind, DeliveryReceipt, Notification, Notifier, NotifyError};
pub use store::{JobOutcome, JobStore};
pub use types::{JobId, Target, Timestamp};
