//! Client for AUTOMATIC1111-style `sdapi/v1` servers
//!
//! Submits a txt2img job and polls `progress` alongside it so long renders
//! show up in the log.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{BackendError, GenerationBackend, GenerationRequest};
use crate::config::BackendConfig;

/// Body of `GET progress`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressResponse {
    /// Fraction complete, 0.0 to 1.0
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub state: ProgressState,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressState {
    #[serde(default)]
    pub sampling_step: u32,
    #[serde(default)]
    pub sampling_steps: u32,
    #[serde(default)]
    pub job_count: u32,
}

impl ProgressResponse {
    pub fn percent(&self) -> f64 {
        self.progress * 100.0
    }

    /// Backend reports nothing left to do
    pub fn is_finished(&self) -> bool {
        self.percent() >= 100.0 || self.state.job_count == 0
    }
}

/// Decides when polling can stop.
///
/// The server reports `job_count == 0` for a moment before it picks up a
/// freshly submitted job, so the first finished report is ignored.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    seen_finished: bool,
}

impl ProgressTracker {
    /// Feed one poll result; returns true once polling should stop
    pub fn observe(&mut self, progress: &ProgressResponse) -> bool {
        if !progress.is_finished() {
            return false;
        }
        if self.seen_finished {
            return true;
        }
        self.seen_finished = true;
        false
    }
}

/// HTTP client for a txt2img server
pub struct WebUiClient {
    base_url: String,
    http: Client,
    negative_suffix: String,
    sampler: String,
    cfg_scale: f64,
    poll_interval: Duration,
}

impl WebUiClient {
    /// Create a new client from configuration
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        debug!(?config, "from_config: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            base_url,
            http,
            negative_suffix: config.negative_prompt.clone(),
            sampler: config.sampler.clone(),
            cfg_scale: config.cfg_scale,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build the txt2img request body
    fn build_request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        debug!(width = request.width, height = request.height, steps = request.steps, "build_request_body: called");
        serde_json::json!({
            "prompt": request.prompt,
            "negative_prompt": format!("{}{}", request.negative_prompt, self.negative_suffix),
            "steps": request.steps,
            "sampler_name": self.sampler,
            "cfg_scale": self.cfg_scale,
            "width": request.width,
            "height": request.height,
        })
    }
}

#[async_trait]
impl GenerationBackend for WebUiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<Vec<String>, BackendError> {
        debug!(prompt_len = request.prompt.len(), "generate: called");
        let body = self.build_request_body(&request);

        let poller = tokio::spawn(poll_progress(
            self.http.clone(),
            self.endpoint("progress"),
            self.poll_interval,
        ));

        let result = submit(&self.http, &self.endpoint("txt2img"), &body).await;
        poller.abort();

        let images = result?;
        info!(count = images.len(), "Generation complete");
        Ok(images)
    }
}

async fn submit(http: &Client, url: &str, body: &serde_json::Value) -> Result<Vec<String>, BackendError> {
    let response = http.post(url).json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(BackendError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let payload: serde_json::Value = response.json().await?;
    extract_images(&payload)
}

/// Pull the base64 image list out of a txt2img response
pub(crate) fn extract_images(payload: &serde_json::Value) -> Result<Vec<String>, BackendError> {
    let Some(images) = payload.get("images").and_then(|v| v.as_array()) else {
        return Err(BackendError::NoImages(payload.to_string()));
    };
    Ok(images.iter().filter_map(|v| v.as_str()).map(str::to_string).collect())
}

async fn poll_progress(http: Client, url: String, interval: Duration) {
    let mut tracker = ProgressTracker::default();
    loop {
        tokio::time::sleep(interval).await;

        let progress = match http.get(&url).send().await {
            Ok(response) => response.json::<ProgressResponse>().await,
            Err(e) => Err(e),
        };
        match progress {
            Ok(progress) => {
                info!(
                    "Progress: {:.1}% ({}/{})",
                    progress.percent(),
                    progress.state.sampling_step,
                    progress.state.sampling_steps
                );
                if tracker.observe(&progress) {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Progress polling failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(fraction: f64, job_count: u32) -> ProgressResponse {
        ProgressResponse {
            progress: fraction,
            state: ProgressState {
                sampling_step: 0,
                sampling_steps: 40,
                job_count,
            },
        }
    }

    #[test]
    fn test_request_body_appends_negative_suffix() {
        let config = BackendConfig {
            base_url: "http://example.test/sdapi/v1".to_string(),
            negative_prompt: "lowres,".to_string(),
            ..Default::default()
        };
        let client = WebUiClient::from_config(&config).unwrap();
        let request = GenerationRequest {
            prompt: "smiling, ".to_string(),
            negative_prompt: "blurry, ".to_string(),
            width: 512,
            height: 768,
            steps: 20,
        };

        let body = client.build_request_body(&request);
        assert_eq!(body["prompt"], "smiling, ");
        assert_eq!(body["negative_prompt"], "blurry, lowres,");
        assert_eq!(body["sampler_name"], "DPM++ 2M");
        assert_eq!(body["width"], 512);
        assert_eq!(body["height"], 768);
        assert_eq!(body["steps"], 20);
        assert_eq!(client.endpoint("txt2img"), "http://example.test/sdapi/v1/txt2img");
    }

    #[test]
    fn test_tracker_ignores_first_finished_report() {
        let mut tracker = ProgressTracker::default();
        assert!(!tracker.observe(&progress(0.0, 0)));
        assert!(!tracker.observe(&progress(0.5, 1)));
        assert!(tracker.observe(&progress(1.0, 1)));
    }

    #[test]
    fn test_progress_parses_partial_body() {
        let parsed: ProgressResponse = serde_json::from_str(r#"{"progress": 0.25, "state": {"job_count": 1}}"#).unwrap();
        assert_eq!(parsed.percent(), 25.0);
        assert_eq!(parsed.state.sampling_steps, 0);
        assert!(!parsed.is_finished());
    }

    #[test]
    fn test_extract_images() {
        let payload = serde_json::json!({"images": ["aGVsbG8=", "d29ybGQ="], "info": "{}"});
        assert_eq!(extract_images(&payload).unwrap(), vec!["aGVsbG8=", "d29ybGQ="]);

        let err = extract_images(&serde_json::json!({"detail": "Not Found"})).unwrap_err();
        assert!(matches!(err, BackendError::NoImages(body) if body.contains("Not Found")));
    }
}
