//! Concurrency-safe job queue: an ordered pending sequence plus a single
//! active slot.
//!
//! Every operation, reads included, runs under one [`tokio::sync::Mutex`]
//! guarding the whole [`QueueState`], so a job moving from the pending
//! sequence into the active slot is never observable as missing from
//! both. Critical sections are short and never span an `.await` on
//! anything other than the lock itself.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::job::{Job, JobStatus};
use crate::types::JobId;

/// How the active job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Failure,
}

impl JobOutcome {
    fn status(self) -> JobStatus {
        match self {
            Self::Success => JobStatus::Completed,
            Self::Failure => JobStatus::Failed,
        }
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    active: Option<Job>,
}

/// The sole authority over queue ordering and job status.
///
/// Construct one per process and share it via `Arc<JobStore>` with the
/// dispatcher and every request handler.
pub struct JobStore {
    state: Mutex<QueueState>,
    /// Signalled when the pending sequence goes from empty to non-empty.
    work_ready: Notify,
    per_job_duration: Duration,
}

impl JobStore {
    /// Create an empty store. `per_job_duration` drives [`estimate_wait`].
    ///
    /// [`estimate_wait`]: Self::estimate_wait
    pub fn new(per_job_duration: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            work_ready: Notify::new(),
            per_job_duration,
        }
    }

    /// Append a job to the end of the pending sequence.
    ///
    /// Returns its 1-based position among pending jobs (the active job is
    /// not counted). Callers must supply a job with a fresh id.
    pub async fn enqueue(&self, job: Job) -> usize {
        let mut state = self.state.lock().await;
        let was_empty = state.pending.is_empty();
        state.pending.push_back(job);
        let position = state.pending.len();
        drop(state);

        if was_empty {
            self.work_ready.notify_one();
        }
        position
    }

    /// Move the front pending job into the active slot and return it.
    ///
    /// Returns `None` when nothing is pending, or while another job still
    /// occupies the active slot.
    pub async fn dequeue_next(&self) -> Option<Job> {
        let mut state = self.state.lock().await;
        if state.active.is_some() {
            return None;
        }
        let mut job = state.pending.pop_front()?;
        job.transition(JobStatus::Active);
        state.active = Some(job.clone());
        Some(job)
    }

    /// Clear the active slot, recording how the job ended.
    ///
    /// Returns the finished job, or `None` when nothing was active (a
    /// no-op, so callers may invoke it unconditionally).
    pub async fn complete(&self, outcome: JobOutcome) -> Option<Job> {
        let mut state = self.state.lock().await;
        let mut job = state.active.take()?;
        job.transition(outcome.status());
        Some(job)
    }

    /// Look a job up by id in the pending sequence, then the active slot.
    ///
    /// Returns a copy; the stored job cannot be modified through it.
    pub async fn find_by_id(&self, id: JobId) -> Option<Job> {
        let state = self.state.lock().await;
        state
            .pending
            .iter()
            .chain(state.active.iter())
            .find(|job| job.id() == id)
            .cloned()
    }

    /// 1-based position of a pending job, `None` if it is not pending.
    pub async fn position_of(&self, id: JobId) -> Option<usize> {
        let state = self.state.lock().await;
        state
            .pending
            .iter()
            .position(|job| job.id() == id)
            .map(|i| i + 1)
    }

    /// Point-in-time copy of the pending sequence, front first.
    pub async fn pending_snapshot(&self) -> Vec<Job> {
        self.state.lock().await.pending.iter().cloned().collect()
    }

    /// Copy of the job currently in the active slot.
    pub async fn active(&self) -> Option<Job> {
        self.state.lock().await.active.clone()
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Estimated wait for a job at `position`: `position * per_job_duration`.
    pub fn estimate_wait(&self, position: usize) -> Duration {
        estimate_wait(position, self.per_job_duration)
    }

    pub fn per_job_duration(&self) -> Duration {
        self.per_job_duration
    }

    /// Resolve once work may be available.
    ///
    /// A wakeup issued while nobody is waiting is retained, so calling
    /// this after [`dequeue_next`](Self::dequeue_next) returned `None`
    /// cannot miss an enqueue that raced with it.
    pub async fn wait_for_work(&self) {
        self.work_ready.notified().await;
    }
}

/// `position * per_job`, saturating at [`Duration::MAX`].
pub fn estimate_wait(position: usize, per_job: Duration) -> Duration {
    u32::try_from(position)
        .ok()
        .and_then(|n| per_job.checked_mul(n))
        .unwrap_or(Duration::MAX)
}
