#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use genqueue_api::config::{QueueConfig, ServerConfig};
use genqueue_api::router::build_app_router;
use genqueue_api::state::AppState;
use genqueue_api::ws::WsManager;
use genqueue_core::{
    ArtifactRef, Backend, BackendError, DeliveryReceipt, GenerationParams, JobStore, Notification, Notifier,
    NotifyError, Target,
};
use genqueue_events::EventBus;
use http_body_util::BodyExt;
use tokio::sync::Notify;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Notifier that records deliveries and fails on demand per target.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Target, Notification)>>,
    failing: Mutex<HashSet<Target>>,
    fail_attachments: Mutex<HashSet<Target>>,
    panic_on_attachments: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every delivery to `target` fails.
    pub fn fail_for(&self, target: Target) {
        self.failing.lock().unwrap().insert(target);
    }

    /// Deliveries carrying attachments to `target` fail; text still works.
    pub fn fail_attachments_for(&self, target: Target) {
        self.fail_attachments.lock().unwrap().insert(target);
    }

    /// Any delivery carrying attachments panics.
    pub fn panic_on_attachments(&self) {
        self.panic_on_attachments.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(Target, Notification)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, target: &Target) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|(t, _)| t == target)
            .map(|(_, n)| n)
            .collect()
    }

    pub fn texts_to(&self, target: &Target) -> Vec<String> {
        self.sent_to(target).into_iter().map(|n| n.text).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        target: &Target,
        notification: &Notification,
    ) -> Result<DeliveryReceipt, NotifyError> {
        if !notification.attachments.is_empty() && self.panic_on_attachments.load(Ordering::SeqCst) {
            panic!("attachment upload blew up");
        }
        if self.failing.lock().unwrap().contains(target) {
            return Err(NotifyError::Undeliverable(target.clone()));
        }
        if !notification.attachments.is_empty() && self.fail_attachments.lock().unwrap().contains(target) {
            return Err(NotifyError::Transport("attachment rejected".into()));
        }

        self.sent
            .lock()
            .unwrap()
            .push((target.clone(), notification.clone()));

        let link = notification
            .attachments
            .first()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(|n| format!("http://test/artifacts/{n}"));
        Ok(DeliveryReceipt { link })
    }
}

// ---------------------------------------------------------------------------
// FakeBackend
// ---------------------------------------------------------------------------

/// Scripted backend outcome.
pub enum Step {
    Ok(&'static str),
    Err(BackendError),
    Panic,
}

/// Backend that plays back scripted outcomes, optionally holding each
/// generation until released.
#[derive(Default)]
pub struct FakeBackend {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<GenerationParams>>,
    gated: bool,
    pub started: Notify,
    pub release: Notify,
}

impl FakeBackend {
    pub fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    /// Each generation waits for [`release`](Self::release) after
    /// signalling [`started`](Self::started).
    pub fn gated(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            gated: true,
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<GenerationParams> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn generate(&self, params: &GenerationParams) -> Result<ArtifactRef, BackendError> {
        self.calls.lock().unwrap().push(params.clone());
        if self.gated {
            self.started.notify_one();
            self.release.notified().await;
        }
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Ok(name)) => Ok(ArtifactRef::new(PathBuf::from("/output").join(name))),
            Some(Step::Err(e)) => Err(e),
            Some(Step::Panic) => panic!("backend blew up"),
            None => Ok(ArtifactRef::new("/output/default.png")),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

pub fn params(prompt: &str) -> GenerationParams {
    GenerationParams {
        positive_prompt: prompt.into(),
        negative_prompt: "blurry".into(),
        width: 1024,
        height: 1024,
        model_style: "realistic".into(),
        reference_image_path: PathBuf::from("/assets/default.png"),
        reference_weight: 0.3,
        seed: Some(7),
    }
}

pub fn user(id: &str) -> Target {
    Target::User(id.into())
}

pub fn channel(id: &str) -> Target {
    Target::Channel(id.into())
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

// ---------------------------------------------------------------------------
// HTTP app
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

pub fn queue_config(root: &Path) -> QueueConfig {
    QueueConfig {
        per_job_duration: Duration::from_secs(60),
        default_negative_prompt: "blurry, low quality, distorted".into(),
        default_reference_path: root.join("default_reference.png"),
        allowed_extensions: ["jpg", "jpeg", "png", "webp"].iter().map(|s| s.to_string()).collect(),
        temp_dir: root.join("temp"),
        temp_max_age: Duration::from_secs(3600),
        public_base_url: "http://localhost:3000".into(),
        notify_webhook_url: None,
        report_target: None,
    }
}

/// Full router plus handles on its collaborators.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
    pub root: tempfile::TempDir,
}

impl TestApp {
    pub fn artifact_dir(&self) -> PathBuf {
        self.root.path().join("output")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.state.queue_config.temp_dir.clone()
    }
}

/// Build the full application router with the production middleware stack.
pub fn build_test_app() -> TestApp {
    let root = tempfile::tempdir().unwrap();
    let artifact_dir = root.path().join("output");
    std::fs::create_dir_all(&artifact_dir).unwrap();

    let notifier = RecordingNotifier::new();
    let config = test_config();
    let state = AppState {
        config: Arc::new(config.clone()),
        queue_config: Arc::new(queue_config(root.path())),
        store: Arc::new(JobStore::new(Duration::from_secs(60))),
        notifier: notifier.clone(),
        ws_manager: Arc::new(WsManager::new()),
        event_bus: Arc::new(EventBus::default()),
    };

    let router = build_app_router(state.clone(), &config, &artifact_dir).unwrap();
    TestApp {
        router,
        state,
        notifier,
        root,
    }
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &TestApp, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
