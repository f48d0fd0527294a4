use std::sync::Arc;

use genqueue_core::{JobStore, Notifier};
use genqueue_events::EventBus;

use crate::config::{QueueConfig, ServerConfig};
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub queue_config: Arc<QueueConfig>,
    /// The single job queue shared with the dispatcher.
    pub store: Arc<JobStore>,
    /// Outbound user/channel messages (WebSocket or webhook).
    pub notifier: Arc<dyn Notifier>,
    /// WebSocket connection manager (chat clients).
    pub ws_manager: Arc<WsManager>,
    /// Centralized event bus for publishing job lifecycle events.
    pub event_bus: Arc<EventBus>,
}
