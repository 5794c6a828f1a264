//! Configuration for promptforge

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::compose::{ComposeOptions, DEFAULT_BREAK_TOKEN};

/// Main promptforge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the element library file
    pub library: PathBuf,

    /// Composition defaults
    pub compose: ComposeConfig,

    /// Generation backend settings
    pub backend: BackendConfig,

    /// Directory `pf generate` writes results into
    #[serde(rename = "output-dir")]
    pub output_dir: PathBuf,
}

fn default_library_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("promptforge")
        .join("library.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library: default_library_path(),
            compose: ComposeConfig::default(),
            backend: BackendConfig::default(),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: ./promptforge.yml
        let local_config = PathBuf::from("promptforge.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/promptforge/promptforge.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("promptforge").join("promptforge.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Composition defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// Separator between character groups
    #[serde(rename = "break-token")]
    pub break_token: String,

    /// Reject gendered tags attached to a character of another gender
    #[serde(rename = "enforce-gender")]
    pub enforce_gender: bool,

    /// Decimal places for printed weights
    #[serde(rename = "weight-precision")]
    pub weight_precision: Option<usize>,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            break_token: DEFAULT_BREAK_TOKEN.to_string(),
            enforce_gender: false,
            weight_precision: None,
        }
    }
}

impl ComposeConfig {
    pub fn options(&self) -> ComposeOptions {
        ComposeOptions {
            break_token: self.break_token.clone(),
            enforce_gender: self.enforce_gender,
            weight_precision: self.weight_precision,
        }
    }
}

/// Settings for the txt2img backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// API root, ending in a slash
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Suffix appended to every negative prompt
    #[serde(rename = "negative-prompt")]
    pub negative_prompt: String,

    pub width: u32,

    pub height: u32,

    pub steps: u32,

    pub sampler: String,

    #[serde(rename = "cfg-scale")]
    pub cfg_scale: f64,

    /// Delay between progress polls
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7860/sdapi/v1/".to_string(),
            negative_prompt: "watermark, author tag, Patreon, bad quality, worst quality, worst detail, sketch, censor,"
                .to_string(),
            width: 896,
            height: 1440,
            steps: 40,
            sampler: "DPM++ 2M".to_string(),
            cfg_scale: 7.0,
            poll_interval_ms: 500,
            timeout_ms: 600_000,
        }
    }
}
