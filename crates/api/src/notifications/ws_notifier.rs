//! Delivers notifications to subscribed WebSocket clients.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::Message;
use genqueue_core::{DeliveryReceipt, Notification, Notifier, NotifyError, Target};
use genqueue_events::delivery::payload::build_payload;
use genqueue_events::ArtifactLinks;

use crate::ws::WsManager;

/// [`Notifier`] that pushes JSON messages through the [`WsManager`].
///
/// A target with no live subscriber is [`NotifyError::Undeliverable`].
pub struct WsNotifier {
    ws_manager: Arc<WsManager>,
    links: ArtifactLinks,
}

impl WsNotifier {
    pub fn new(ws_manager: Arc<WsManager>, links: ArtifactLinks) -> Self {
        Self { ws_manager, links }
    }
}

#[async_trait]
impl Notifier for WsNotifier {
    async fn notify(
        &self,
        target: &Target,
        notification: &Notification,
    ) -> Result<DeliveryReceipt, NotifyError> {
        let (payload, link) = build_payload(&self.links, target, notification);
        let delivered = self
            .ws_manager
            .send_to_target(target, Message::Text(payload.to_string().into()))
            .await;

        if delivered == 0 {
            tracing::debug!(recipient = %target, "No WebSocket subscriber for target");
            return Err(NotifyError::Undeliverable(target.clone()));
        }

        tracing::debug!(recipient = %target, connections = delivered, "Notification pushed");
        Ok(DeliveryReceipt { link })
    }
}
