//! WebSocket infrastructure for chat clients.
//!
//! Provides connection management with per-target subscriptions,
//! heartbeat monitoring, and the HTTP upgrade handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::{ws_handler, WsParams};
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
