//! ComfyUI generation backend.
//!
//! Turns [`GenerationParams`](genqueue_core::GenerationParams) into an
//! API-format workflow, submits it over ComfyUI's REST interface, waits
//! for the prompt to finish and resolves the saved image on disk.

pub mod api;
pub mod backend;
pub mod history;
pub mod output;
pub mod reference;
pub mod workflow;

pub use backend::{ComfyUIBackend, ComfyUIConfig};
