//! Notifier implementations owned by the API server.

mod ws_notifier;

pub use ws_notifier::WsNotifier;
