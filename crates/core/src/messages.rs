//! User-facing message texts.

use std::time::Duration;

use crate::job::Job;

/// How a job entered the queue; only changes the wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    New,
    Remix,
    Regenerate,
}

/// Acknowledgement sent to the requester right after enqueueing.
pub fn queued(kind: SubmissionKind, position: usize, wait: Duration) -> String {
    let subject = match kind {
        SubmissionKind::New => "image generation request",
        SubmissionKind::Remix => "remixed image generation request",
        SubmissionKind::Regenerate => "image regeneration request",
    };
    format!(
        "Your {subject} has been queued. You are number {position} in line. \
         Estimated wait time: {} seconds.",
        wait.as_secs()
    )
}

/// Sent to every waiter after the queue advances.
pub fn position_update(position: usize, wait: Duration) -> String {
    format!(
        "Your image generation request is now at position {position}. \
         Estimated wait time: {} seconds.",
        wait.as_secs()
    )
}

/// Caption delivered with a finished artifact.
pub fn result_caption(job: &Job) -> String {
    let params = job.parameters();
    format!(
        "<@{}> Here's your generated image!\n\
         Positive prompt: {}\n\
         Negative prompt: {}\n\
         Model: {}\n\
         Aspect ratio: {}",
        job.requester(),
        params.positive_prompt,
        params.negative_prompt,
        params.model_style,
        params.aspect_ratio(),
    )
}

/// Text-only replacement when an attachment could not be delivered.
pub fn link_fallback(caption: &str, link: &str) -> String {
    format!("{caption}\n\nYou can view the image here: {link}")
}

pub fn generation_failed(error: &dyn std::fmt::Display) -> String {
    format!("An error occurred while generating your image: {error}")
}

pub fn regenerate_failed(error: &dyn std::fmt::Display) -> String {
    format!("An error occurred while processing your regeneration request: {error}")
}

pub fn remix_failed(error: &dyn std::fmt::Display) -> String {
    format!("An error occurred while processing your remix request: {error}")
}
