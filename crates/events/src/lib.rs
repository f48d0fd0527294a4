//! genqueue event bus, usage statistics and outbound delivery.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`QueueEvent`]: job lifecycle event envelope.
//! - [`UsageStats`]: subscriber that records completed generations.
//! - [`ReportScheduler`]: periodic usage reports to a chat target.
//! - [`delivery`]: notification payloads and the webhook [`Notifier`].
//!
//! [`Notifier`]: genqueue_core::Notifier

pub mod bus;
pub mod delivery;
pub mod report;
pub mod stats;

pub use bus::{EventBus, QueueEvent};
pub use delivery::payload::ArtifactLinks;
pub use delivery::webhook::WebhookNotifier;
pub use report::{ReportPeriod, ReportScheduler};
pub use stats::{UsageStats, UsageSummary};
