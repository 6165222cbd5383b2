//! Media recorder interface
//!
//! The encoder and muxer belong to the host platform. A recorder is bound to
//! one live capture stream and pushes encoded chunks into a [`ChunkSink`].

use crate::capture::CaptureStream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while driving a recorder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("Unsupported recorder configuration: {0}")]
    NotSupported(String),

    #[error("Capture stream {0} is not active")]
    StreamInactive(String),

    #[error("Bridge error: {0}")]
    Bridge(String),
}

/// Result type for recorder operations
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderOptions {
    /// Container media type, e.g. `video/webm`
    pub mime_type: String,

    /// Chunk flush interval in milliseconds
    pub timeslice_ms: u64,
}

/// Recorder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Recording,
    Inactive,
}

/// Destination for encoded chunks
///
/// Cheap to clone; every clone feeds the same recording session.
#[derive(Clone)]
pub struct ChunkSink {
    deliver: Arc<dyn Fn(Vec<u8>) + Send + Sync>,
}

impl ChunkSink {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn deliver(&self, data: Vec<u8>) {
        (self.deliver)(data)
    }
}

impl fmt::Debug for ChunkSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkSink").finish_non_exhaustive()
    }
}

/// A running recorder bound to one capture stream
#[async_trait]
pub trait MediaRecorder: Send + Sync {
    fn state(&self) -> RecorderState;

    /// Flush pending data and invalidate the recorder.
    ///
    /// Stopping an inactive recorder is a no-op.
    async fn stop(&mut self) -> RecorderResult<()>;
}

/// Creates recorders for live capture streams
#[async_trait]
pub trait RecorderFactory: Send + Sync {
    /// Bind a recorder to `stream` and start periodic chunk delivery into `sink`.
    ///
    /// Resolves once the platform confirms the recorder is running. A recorder
    /// the platform cannot construct fails with [`RecorderError::NotSupported`].
    async fn start(
        &self,
        stream: &dyn CaptureStream,
        options: &RecorderOptions,
        sink: ChunkSink,
    ) -> RecorderResult<Box<dyn MediaRecorder>>;
}

/// Reject configurations no recorder can honor before touching the platform
pub fn check_options(options: &RecorderOptions) -> RecorderResult<()> {
    if !options.mime_type.starts_with("video/") {
        return Err(RecorderError::NotSupported(format!(
            "mime type {:?} is not a video container",
            options.mime_type
        )));
    }
    if options.timeslice_ms == 0 {
        return Err(RecorderError::NotSupported(
            "timeslice must be positive".to_string(),
        ));
    }
    Ok(())
}
