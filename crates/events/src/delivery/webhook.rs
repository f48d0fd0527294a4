//! Webhook [`Notifier`] with exponential-backoff retry.
//!
//! [`WebhookNotifier`] POSTs the JSON notification payload to a chat
//! webhook. Failed attempts are retried three times with exponential
//! backoff (1 s, 2 s, 4 s).

use std::time::Duration;

use async_trait::async_trait;
use genqueue_core::{DeliveryReceipt, Notification, Notifier, NotifyError, Target};

use super::payload::{build_payload, ArtifactLinks};

/// Retry delays (exponential backoff: 1s, 2s, 4s).
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// WebhookNotifier
// ---------------------------------------------------------------------------

/// Delivers notifications to a single webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    links: ArtifactLinks,
    retry_delays: Vec<Duration>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, links: ArtifactLinks) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
            links,
            retry_delays: RETRY_DELAYS.to_vec(),
        })
    }

    /// Replace the backoff schedule. An empty schedule means one attempt.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Post `payload`, retrying per the backoff schedule.
    async fn deliver(&self, payload: &serde_json::Value) -> Result<(), WebhookError> {
        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            match self.try_send(payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url = %self.url,
                        error = %e,
                        "Webhook delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        // Final attempt after the last backoff.
        self.try_send(payload).await.inspect_err(|e| {
            tracing::error!(url = %self.url, error = %e, "Webhook delivery failed after all retries");
        })
    }

    async fn try_send(&self, payload: &serde_json::Value) -> Result<(), WebhookError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        target: &Target,
        notification: &Notification,
    ) -> Result<DeliveryReceipt, NotifyError> {
        let (payload, link) = build_payload(&self.links, target, notification);
        self.deliver(&payload)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(DeliveryReceipt { link })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;

    #[derive(Default)]
    struct Hook {
        calls: AtomicU32,
        fail_first: u32,
        bodies: Mutex<Vec<serde_json::Value>>,
    }

    async fn receive(State(hook): State<Arc<Hook>>, Json(body): Json<serde_json::Value>) -> StatusCode {
        let call = hook.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= hook.fail_first {
            return StatusCode::BAD_GATEWAY;
        }
        hook.bodies.lock().unwrap().push(body);
        StatusCode::NO_CONTENT
    }

    async fn start_hook(fail_first: u32) -> (String, Arc<Hook>) {
        let hook = Arc::new(Hook {
            fail_first,
            ..Default::default()
        });
        let app = Router::new()
            .route("/hook", post(receive))
            .with_state(Arc::clone(&hook));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), hook)
    }

    fn notifier(url: String) -> WebhookNotifier {
        WebhookNotifier::new(url, ArtifactLinks::new("http://public"))
            .unwrap()
            .with_retry_delays(vec![Duration::ZERO; 3])
    }

    #[tokio::test]
    async fn delivers_payload_and_returns_link() {
        let (url, hook) = start_hook(0).await;
        let receipt = notifier(url)
            .notify(
                &Target::User("U1".into()),
                &Notification::text("hi").with_attachment("/out/x.png"),
            )
            .await
            .unwrap();

        assert_eq!(receipt.link.as_deref(), Some("http://public/artifacts/x.png"));
        let bodies = hook.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["text"], "hi");
    }

    #[tokio::test]
    async fn retries_until_success() {
        let (url, hook) = start_hook(2).await;
        let result = notifier(url)
            .notify(&Target::User("U1".into()), &Notification::text("hi"))
            .await;

        assert!(result.is_ok());
        assert_eq!(hook.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_all_retries() {
        let (url, hook) = start_hook(u32::MAX).await;
        let result = notifier(url)
            .notify(&Target::User("U1".into()), &Notification::text("hi"))
            .await;

        assert!(matches!(result, Err(NotifyError::Transport(msg)) if msg.contains("502")));
        assert_eq!(hook.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn webhook_error_display_http_status() {
        let err = WebhookError::HttpStatus(502);
        assert_eq!(err.to_string(), "Webhook returned HTTP 502");
    }
}
