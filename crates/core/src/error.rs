use crate::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The job is neither pending nor active (completed and evicted, or
    /// the id never existed).
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
