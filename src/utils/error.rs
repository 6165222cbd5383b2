//! Error types and handling
//!
//! Common error types used across the application.

use crate::capture::CaptureError;
use crate::config::ConfigError;
use crate::export::ExportError;
use crate::recorder::{RecorderError, Trigger};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the screen sharing controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScreenSharingError {
    #[error("{0} is not available in the current state")]
    ButtonDisabled(Trigger),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Capture was cancelled before it was granted")]
    Cancelled,

    #[error("Screen sharing controller has shut down")]
    ControllerGone,
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Screen sharing error: {0}")]
    ScreenSharing(#[from] ScreenSharingError),

    #[error("Bridge error: {0}")]
    Bridge(String),
}

/// Error response for frontend
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::ScreenSharing(inner) => match inner {
                ScreenSharingError::ButtonDisabled(_) => "BUTTON_DISABLED",
                ScreenSharingError::Capture(CaptureError::Denied(_)) => "CAPTURE_DENIED",
                ScreenSharingError::Capture(_) => "CAPTURE_ERROR",
                ScreenSharingError::Recorder(_) => "RECORDER_ERROR",
                ScreenSharingError::Export(_) => "EXPORT_ERROR",
                ScreenSharingError::Cancelled => "CANCELLED",
                ScreenSharingError::ControllerGone => "CONTROLLER_GONE",
            },
            AppError::Bridge(_) => "BRIDGE_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
