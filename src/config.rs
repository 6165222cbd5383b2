//! Screen sharing configuration
//!
//! Every field has a default, so an empty JSON object is a valid config and
//! a missing config file simply yields [`ScreenSharingConfig::default`].

use crate::capture::CaptureConstraints;
use crate::recorder::RecorderOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the config file inside the app config directory
pub const CONFIG_FILE_NAME: &str = "screen-sharing.json";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Widget configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenSharingConfig {
    /// Container media type requested from the recorder and tagged on the artifact
    #[serde(default = "default_mime_type")]
    pub mime_type: String,

    /// Recorder chunk flush interval in milliseconds
    #[serde(default = "default_timeslice_ms")]
    pub timeslice_ms: u64,

    /// File name offered for the downloaded recording
    #[serde(default = "default_download_filename")]
    pub download_filename: String,

    /// Whether to ask for an audio track alongside video
    #[serde(default)]
    pub capture_audio: bool,

    /// Where downloads land (None = platform downloads directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,

    /// How long to wait for the webview to confirm a recorder start or stop
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_mime_type() -> String {
    "video/webm".to_string()
}

fn default_timeslice_ms() -> u64 {
    10
}

fn default_download_filename() -> String {
    "screen-recording.webm".to_string()
}

fn default_stop_timeout_ms() -> u64 {
    2000
}

impl Default for ScreenSharingConfig {
    fn default() -> Self {
        Self {
            mime_type: default_mime_type(),
            timeslice_ms: default_timeslice_ms(),
            download_filename: default_download_filename(),
            capture_audio: false,
            download_dir: None,
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl ScreenSharingConfig {
    /// Load a config file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::info!("Loaded screen sharing config from {:?}", path);
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mime_type.trim().is_empty() {
            return Err(ConfigError::Invalid("mimeType must not be empty".to_string()));
        }
        if self.timeslice_ms == 0 {
            return Err(ConfigError::Invalid("timesliceMs must be positive".to_string()));
        }
        if self.download_filename.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "downloadFilename must not be empty".to_string(),
            ));
        }
        if self.download_filename.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "downloadFilename must be a bare file name: {}",
                self.download_filename
            )));
        }
        Ok(())
    }

    /// Constraints passed to the capture request (video is always requested)
    pub fn constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            video: true,
            audio: self.capture_audio,
        }
    }

    pub fn recorder_options(&self) -> RecorderOptions {
        RecorderOptions {
            mime_type: self.mime_type.clone(),
            timeslice_ms: self.timeslice_ms,
        }
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Resolve the downloads directory
    pub fn resolve_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(std::env::temp_dir)
    }
}
