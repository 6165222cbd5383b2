//! Screen capture
//!
//! This module provides the capture source traits, the session that holds the
//! active stream, and the webview bridge that implements them.

pub mod bridge;
pub mod session;
pub mod traits;

// Re-export traits
pub use traits::{
    CaptureConstraints, CaptureError, CaptureResult, CaptureStream, DisplayMediaSource, TrackInfo,
    TrackKind,
};

pub use bridge::{BridgeEmitter, BridgeRequest, CaptureOutcome, WebviewBridge, BRIDGE_EVENT};
pub use session::CaptureSession;
