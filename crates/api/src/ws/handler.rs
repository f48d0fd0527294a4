use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use genqueue_core::Target;
use serde::Deserialize;

use crate::state::AppState;
use crate::ws::manager::WsManager;

/// Subscriptions requested on connect: `?user=U1&channel=C1`.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub user: Option<String>,
    pub channel: Option<String>,
}

impl WsParams {
    pub fn targets(self) -> Vec<Target> {
        let user = self.user.filter(|u| !u.is_empty()).map(Target::User);
        let channel = self.channel.filter(|c| !c.is_empty()).map(Target::Channel);
        user.into_iter().chain(channel).collect()
    }
}

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is registered with `WsManager` and
/// managed by two tasks (sender + receiver).
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let targets = params.targets();
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager, targets))
}

/// Manage a single WebSocket connection after upgrade.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>, targets: Vec<Target>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, targets = ?targets, "WebSocket connected");

    let mut rx = ws_manager.add(conn_id.clone(), targets).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Inbound frames carry nothing; read until the client goes away.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
