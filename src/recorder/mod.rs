//! Recording system module
//!
//! This module implements the recording side of the widget:
//! - UiState/ButtonState state machine
//! - MediaRecorder trait for the platform encoder
//! - RecordingBuffer for encoded chunks
//! - ScreenSharing controller that ties capture, recording and export together

pub mod buffer;
pub mod controller;
pub mod media;
pub mod state;

pub use buffer::{Chunk, RecordingBuffer};
pub use controller::{DownloadOutcome, Platform, ScreenSharing, ScreenSharingEvent, Snapshot, STATE_EVENT};
pub use media::{ChunkSink, MediaRecorder, RecorderError, RecorderFactory, RecorderOptions, RecorderState};
pub use state::{ButtonState, Trigger, UiState};
