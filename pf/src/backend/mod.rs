//! Image generation backend
//!
//! The composer hands its prompt to a [`GenerationBackend`]. The shipped
//! implementation talks to an AUTOMATIC1111-style `sdapi/v1` server. Images
//! come back as the base64 strings the server sends; nothing here decodes them.

mod error;
mod webui;

pub use error::BackendError;
pub use webui::{ProgressResponse, ProgressState, ProgressTracker, WebUiClient};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single txt2img job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
}

/// Anything that can turn a prompt into images
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Run one job and return the base64 image payloads
    async fn generate(&self, request: GenerationRequest) -> Result<Vec<String>, BackendError>;
}
