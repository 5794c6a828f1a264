//! Backend error types

use thiserror::Error;

/// Errors that can occur while talking to the generation backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Backend returned no images: {0}")]
    NoImages(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
