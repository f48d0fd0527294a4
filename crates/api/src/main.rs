use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use genqueue_comfyui::ComfyUIBackend;
use genqueue_core::{JobStore, Notifier};
use genqueue_events::{ArtifactLinks, EventBus, ReportScheduler, UsageStats, WebhookNotifier};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genqueue_api::background::temp_cleanup;
use genqueue_api::config::{self, QueueConfig, ServerConfig};
use genqueue_api::engine::Dispatcher;
use genqueue_api::notifications::WsNotifier;
use genqueue_api::router::build_app_router;
use genqueue_api::state::AppState;
use genqueue_api::ws;

/// Budget for event subscribers to drain after the bus closes.
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genqueue_api=debug,genqueue_comfyui=info,genqueue_events=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    let queue_config = QueueConfig::from_env().context("Invalid queue configuration")?;
    let comfyui_config = config::comfyui_from_env().context("Invalid ComfyUI configuration")?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    tracing::info!(
        api_url = %comfyui_config.api_url,
        models = comfyui_config.models.len(),
        per_job_secs = queue_config.per_job_duration.as_secs(),
        "Loaded generation configuration",
    );

    let background_cancel = CancellationToken::new();

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager), background_cancel.clone());

    // --- Notifier ---
    let links = ArtifactLinks::new(queue_config.public_base_url.clone());
    let notifier: Arc<dyn Notifier> = match &queue_config.notify_webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "Delivering notifications via webhook");
            Arc::new(WebhookNotifier::new(url.clone(), links.clone()).context("Failed to build webhook client")?)
        }
        None => {
            tracing::info!("Delivering notifications via WebSocket");
            Arc::new(WsNotifier::new(Arc::clone(&ws_manager), links.clone()))
        }
    };

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    let usage_stats = Arc::new(UsageStats::new());
    let stats_handle = {
        let stats = Arc::clone(&usage_stats);
        let receiver = event_bus.subscribe();
        tokio::spawn(async move { stats.run(receiver).await })
    };

    let report_handle = queue_config.report_target.clone().map(|target| {
        tracing::info!(recipient = %target, "Usage reports enabled");
        let scheduler = ReportScheduler::new(Arc::clone(&usage_stats), Arc::clone(&notifier), target);
        let cancel = background_cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    });

    // --- Queue ---
    let store = Arc::new(JobStore::new(queue_config.per_job_duration));

    // --- Temp cleanup ---
    let cleanup_handle = tokio::spawn(temp_cleanup::run(
        queue_config.temp_dir.clone(),
        queue_config.temp_max_age,
        Arc::clone(&store),
        background_cancel.clone(),
    ));

    // --- Dispatcher ---
    let artifact_dir = comfyui_config.output_dir.clone();
    let backend = Arc::new(ComfyUIBackend::new(comfyui_config));

    let dispatcher_cancel = CancellationToken::new();
    let dispatcher_handle = {
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            backend,
            Arc::clone(&notifier),
            Arc::clone(&event_bus),
            links,
        );
        let cancel = dispatcher_cancel.clone();
        tokio::spawn(async move { dispatcher.run(cancel).await })
    };

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        queue_config: Arc::new(queue_config),
        store,
        notifier,
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&event_bus),
    };
    let app = build_app_router(state, &config, &artifact_dir).context("Invalid CORS configuration")?;

    // --- Start server ---
    let host = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);

    // The dispatcher finishes the job it holds before observing the cancel.
    dispatcher_cancel.cancel();
    if tokio::time::timeout(shutdown_timeout, dispatcher_handle).await.is_err() {
        tracing::warn!("Dispatcher did not stop within the shutdown timeout");
    }
    tracing::info!("Dispatcher stopped");

    background_cancel.cancel();
    let _ = tokio::time::timeout(shutdown_timeout, cleanup_handle).await;
    if let Some(handle) = report_handle {
        let _ = tokio::time::timeout(shutdown_timeout, handle).await;
    }
    let _ = tokio::time::timeout(shutdown_timeout, heartbeat_handle).await;
    tracing::info!("Background tasks stopped");

    // Dropping the last bus handle closes the channel for the stats task.
    drop(event_bus);
    if tokio::time::timeout(EVENT_DRAIN_TIMEOUT, stats_handle).await.is_err() {
        tracing::debug!("Usage stats still subscribed at shutdown");
    }

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
