//! Periodic removal of stale uploaded reference images.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use genqueue_core::JobStore;
use tokio_util::sync::CancellationToken;

/// How often the cleanup job runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Delete regular files in `dir` whose modification time is at least
/// `max_age` old, except those listed in `keep`. Returns how many were
/// removed.
pub fn purge_older_than(dir: &Path, max_age: Duration, keep: &HashSet<PathBuf>) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() || is_kept(&entry.path(), keep) {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age >= max_age {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Failed to remove temp file");
                }
            }
        }
    }

    Ok(removed)
}

fn is_kept(path: &Path, keep: &HashSet<PathBuf>) -> bool {
    keep.contains(path) || std::fs::canonicalize(path).is_ok_and(|p| keep.contains(&p))
}

/// Reference images of every pending or active job.
async fn referenced_files(store: &JobStore) -> HashSet<PathBuf> {
    let mut jobs = store.pending_snapshot().await;
    jobs.extend(store.active().await);
    jobs.into_iter()
        .map(|job| job.parameters().reference_image_path.clone())
        .collect()
}

/// Run the temp cleanup loop until `cancel` is triggered.
///
/// Uploads still referenced by a queued job survive past `max_age`.
pub async fn run(temp_dir: PathBuf, max_age: Duration, store: Arc<JobStore>, cancel: CancellationToken) {
    tracing::info!(
        dir = %temp_dir.display(),
        max_age_secs = max_age.as_secs(),
        interval_secs = CLEANUP_INTERVAL.as_secs(),
        "Temp cleanup job started"
    );

    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Temp cleanup job stopping");
                break;
            }
            _ = interval.tick() => {
                let dir = temp_dir.clone();
                let keep = referenced_files(&store).await;
                let result = tokio::task::spawn_blocking(move || {
                    if !dir.exists() {
                        return Ok(0);
                    }
                    purge_older_than(&dir, max_age, &keep)
                })
                .await;

                match result {
                    Ok(Ok(0)) => tracing::debug!("Temp cleanup: nothing to remove"),
                    Ok(Ok(removed)) => tracing::info!(removed, "Temp cleanup: removed stale uploads"),
                    Ok(Err(e)) => tracing::error!(error = %e, "Temp cleanup failed"),
                    Err(e) => tracing::error!(error = %e, "Temp cleanup task aborted"),
                }
            }
        }
    }
}
