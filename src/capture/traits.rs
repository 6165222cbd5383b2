//! Capture trait definitions
//!
//! Platform-agnostic traits for the screen capture source. The host platform
//! negotiates permission and produces the stream; this crate only holds it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors that can occur while acquiring or holding a capture stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Screen capture denied: {0}")]
    Denied(String),

    #[error("Screen capture not supported: {0}")]
    NotSupported(String),

    #[error("Capture stream ended: {0}")]
    Ended(String),

    #[error("Bridge error: {0}")]
    Bridge(String),
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Media constraints for the capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub video: bool,
    pub audio: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: false,
        }
    }
}

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Information about a single track in a capture stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    /// Unique track ID
    pub id: String,

    /// Track kind
    pub kind: TrackKind,

    /// Human readable label (e.g. "screen:0:0")
    #[serde(default)]
    pub label: String,
}

/// A live capture stream owned by the component
///
/// The stream becomes inactive as soon as any of its tracks stops, whether
/// that happens through [`CaptureStream::stop_tracks`] or externally (the user
/// revoking the share from the platform UI).
pub trait CaptureStream: Send + Sync {
    /// Stream identifier assigned by the platform
    fn id(&self) -> &str;

    /// Tracks carried by the stream
    fn tracks(&self) -> &[TrackInfo];

    /// Whether the stream is still delivering media
    fn is_active(&self) -> bool;

    /// Register the one-shot listener fired when the stream goes inactive
    /// on its own. Fires immediately if the stream is already inactive.
    fn on_inactive(&mut self) -> oneshot::Receiver<()>;

    /// Stop every track. Has no effect on a stream that is already stopped.
    fn stop_tracks(&mut self);
}

/// Platform entry point for requesting a screen-sharing stream
#[async_trait]
pub trait DisplayMediaSource: Send + Sync {
    /// Suspends until the platform grants or denies screen sharing
    async fn get_display_media(
        &self,
        constraints: &CaptureConstraints,
    ) -> CaptureResult<Box<dyn CaptureStream>>;
}
