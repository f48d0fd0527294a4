//! Background job dispatcher.
//!
//! Drains the [`JobStore`] one job at a time: the next job is only taken
//! after the previous one has been generated, delivered and completed.
//! When the queue is empty the dispatcher sleeps until an enqueue wakes it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use genqueue_core::job_events::{EVENT_JOB_COMPLETED, EVENT_JOB_FAILED, EVENT_JOB_STARTED};
use genqueue_core::messages;
use genqueue_core::{
    Action, ArtifactRef, Backend, BackendError, Job, JobOutcome, JobStore, Notification, Notifier, Target,
};
use genqueue_events::{ArtifactLinks, EventBus, QueueEvent};
use tokio_util::sync::CancellationToken;

/// Single consumer of the job queue.
pub struct Dispatcher {
    store: Arc<JobStore>,
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    event_bus: Arc<EventBus>,
    links: ArtifactLinks,
}

impl Dispatcher {
    pub fn new(
        store: Arc<JobStore>,
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
        event_bus: Arc<EventBus>,
        links: ArtifactLinks,
    ) -> Self {
        Self {
            store,
            backend,
            notifier,
            event_bus,
            links,
        }
    }

    /// Run the dispatcher loop until the cancellation token is triggered.
    ///
    /// Cancellation is only observed between jobs; a job already taken is
    /// always driven to completion.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("Job dispatcher started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.store.dequeue_next().await {
                Some(job) => self.process(job).await,
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.store.wait_for_work() => {}
                    }
                }
            }
        }

        tracing::info!("Job dispatcher shutting down");
    }

    /// Generate, deliver and complete one job, then tell the waiters.
    ///
    /// The active slot is cleared even when generation or delivery panics.
    pub async fn process(&self, job: Job) {
        let job_id = job.id();
        let outcome = match AssertUnwindSafe(self.execute(&job)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!(job_id = %job_id, panic = %reason, "Job processing panicked");
                let notice = Notification::text(messages::generation_failed(&reason));
                if AssertUnwindSafe(self.send(&job.requester_target(), &notice))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    tracing::error!(job_id = %job_id, "Failure notice panicked");
                }
                self.event_bus.publish(
                    QueueEvent::new(EVENT_JOB_FAILED)
                        .for_job(&job)
                        .with_payload(serde_json::json!({ "error": reason, "input_error": false })),
                );
                JobOutcome::Failure
            }
        };

        self.store.complete(outcome).await;

        if AssertUnwindSafe(self.broadcast_positions()).catch_unwind().await.is_err() {
            tracing::error!(job_id = %job_id, "Position broadcast panicked");
        }
    }

    async fn execute(&self, job: &Job) -> JobOutcome {
        tracing::info!(
            job_id = %job.id(),
            requester = job.requester(),
            model_style = %job.parameters().model_style,
            "Processing job",
        );
        self.event_bus
            .publish(QueueEvent::new(EVENT_JOB_STARTED).for_job(job));

        match self.generate(job).await {
            Ok(artifact) => {
                self.deliver_result(job, &artifact).await;
                self.event_bus.publish(
                    QueueEvent::new(EVENT_JOB_COMPLETED)
                        .for_job(job)
                        .with_payload(serde_json::json!({ "artifact": artifact.file_name() })),
                );
                JobOutcome::Success
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job.id(),
                    input_error = e.is_input_error(),
                    error = %e,
                    "Image generation failed",
                );
                self.send(&job.requester_target(), &Notification::text(messages::generation_failed(&e)))
                    .await;
                self.event_bus.publish(
                    QueueEvent::new(EVENT_JOB_FAILED)
                        .for_job(job)
                        .with_payload(serde_json::json!({
                            "error": e.to_string(),
                            "input_error": e.is_input_error(),
                        })),
                );
                JobOutcome::Failure
            }
        }
    }

    /// Call the backend on its own task so a panic cannot leave the
    /// active slot occupied.
    async fn generate(&self, job: &Job) -> Result<ArtifactRef, BackendError> {
        let backend = Arc::clone(&self.backend);
        let params = job.parameters().clone();
        tokio::spawn(async move { backend.generate(&params).await })
            .await
            .unwrap_or_else(|e| Err(BackendError::GenerationFailed(format!("Generation task aborted: {e}"))))
    }

    /// Send the artifact to the requester and, when valid, the destination.
    async fn deliver_result(&self, job: &Job, artifact: &ArtifactRef) {
        let caption = messages::result_caption(job);
        let notification = Notification::text(caption.clone())
            .with_attachment(artifact.path())
            .with_actions(Action::for_job(job.id()));

        let requester = job.requester_target();
        let receipt_link = match self.notifier.notify(&requester, &notification).await {
            Ok(receipt) => receipt.link,
            Err(e) => {
                tracing::warn!(job_id = %job.id(), error = %e, "Failed to deliver result to requester");
                None
            }
        };
        let link = receipt_link.or_else(|| self.links.link_for(artifact.path()));

        match (job.destination(), job.deliverable_destination()) {
            (_, Some(destination)) => {
                self.deliver_to_destination(job, destination, &notification, &caption, link)
                    .await;
            }
            (Some(destination), None) => {
                tracing::warn!(
                    job_id = %job.id(),
                    destination = %destination,
                    "Destination is not a channel distinct from the requester, skipping",
                );
            }
            (None, None) => {}
        }
    }

    /// Destination delivery with fallback: attachment, then a text link to
    /// the destination, then the link to the requester.
    async fn deliver_to_destination(
        &self,
        job: &Job,
        destination: &Target,
        notification: &Notification,
        caption: &str,
        link: Option<String>,
    ) {
        let Err(e) = self.notifier.notify(destination, notification).await else {
            return;
        };
        tracing::warn!(
            job_id = %job.id(),
            destination = %destination,
            error = %e,
            "Failed to deliver result to destination, falling back to link",
        );

        let Some(link) = link else {
            tracing::error!(job_id = %job.id(), "No artifact link available for fallback delivery");
            return;
        };
        let fallback = Notification::text(messages::link_fallback(caption, &link))
            .with_actions(Action::for_job(job.id()));

        if let Err(e) = self.notifier.notify(destination, &fallback).await {
            tracing::warn!(
                job_id = %job.id(),
                destination = %destination,
                error = %e,
                "Link fallback to destination failed, sending link to requester",
            );
            self.send(&job.requester_target(), &fallback).await;
        }
    }

    /// Tell every pending job's requester its new position.
    ///
    /// Best-effort: one failed notification does not stop the rest.
    async fn broadcast_positions(&self) {
        let pending = self.store.pending_snapshot().await;
        for (index, job) in pending.iter().enumerate() {
            let position = index + 1;
            let text = messages::position_update(position, self.store.estimate_wait(position));
            self.send(&job.requester_target(), &Notification::text(text)).await;
        }
    }

    async fn send(&self, target: &Target, notification: &Notification) {
        if let Err(e) = self.notifier.notify(target, notification).await {
            tracing::warn!(recipient = %target, error = %e, "Failed to send notification");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
