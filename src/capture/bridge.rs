//! Webview media bridge
//!
//! The screen-capture and recording APIs live in the webview. The bridge
//! implements [`DisplayMediaSource`] and [`RecorderFactory`] by emitting
//! [`BridgeRequest`]s to the webview and completing them when the webview
//! reports back through IPC commands.

use super::traits::{
    CaptureConstraints, CaptureError, CaptureResult, CaptureStream, DisplayMediaSource, TrackInfo,
    TrackKind,
};
use crate::recorder::media::{
    check_options, ChunkSink, MediaRecorder, RecorderError, RecorderFactory, RecorderOptions,
    RecorderResult, RecorderState,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Event name the webview listens on for bridge requests
pub const BRIDGE_EVENT: &str = "screen-sharing://bridge";

/// Requests sent from the backend to the webview
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeRequest {
    /// Call `navigator.mediaDevices.getDisplayMedia(constraints)`
    #[serde(rename_all = "camelCase")]
    GetDisplayMedia {
        request_id: Uuid,
        constraints: CaptureConstraints,
    },
    /// Create a `MediaRecorder` for the stream and start it with a timeslice
    #[serde(rename_all = "camelCase")]
    StartRecorder {
        stream_id: String,
        mime_type: String,
        timeslice_ms: u64,
    },
    /// Stop the stream's recorder, flushing its last chunk
    #[serde(rename_all = "camelCase")]
    StopRecorder { stream_id: String },
    /// Stop every track of the stream
    #[serde(rename_all = "camelCase")]
    StopTracks { stream_id: String },
}

/// Answer to a `getDisplayMedia` request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CaptureOutcome {
    #[serde(rename_all = "camelCase")]
    Granted {
        stream_id: String,
        #[serde(default)]
        tracks: Vec<TrackInfo>,
    },
    #[serde(rename_all = "camelCase")]
    Denied { reason: String },
}

/// Delivers a request to the webview
pub type BridgeEmitter = Arc<dyn Fn(BridgeRequest) -> Result<(), String> + Send + Sync>;

#[derive(Default)]
struct StreamEntry {
    active: bool,
    inactive_tx: Option<oneshot::Sender<()>>,
    sink: Option<ChunkSink>,
    started_tx: Option<oneshot::Sender<Result<(), String>>>,
    stopped_tx: Option<oneshot::Sender<()>>,
    /// The recorder reported `stop` before the backend asked for it
    recorder_stopped: bool,
}

struct BridgeInner {
    emitter: BridgeEmitter,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<CaptureOutcome>>>,
    streams: Mutex<HashMap<String, StreamEntry>>,
    ack_timeout: Duration,
}

impl BridgeInner {
    fn emit(&self, request: BridgeRequest) -> Result<(), String> {
        tracing::debug!("Bridge request: {:?}", request);
        (self.emitter)(request)
    }

    /// Forget the recorder bound to a stream so no more chunks are routed
    fn detach_recorder(&self, stream_id: &str) {
        if let Some(entry) = self.streams.lock().get_mut(stream_id) {
            entry.sink = None;
            entry.started_tx = None;
        }
    }
}

/// Backend half of the webview media bridge
#[derive(Clone)]
pub struct WebviewBridge {
    inner: Arc<BridgeInner>,
}

impl WebviewBridge {
    /// `ack_timeout` bounds how long recorder start and stop wait for the webview
    pub fn new(emitter: BridgeEmitter, ack_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                emitter,
                pending: Mutex::new(HashMap::new()),
                streams: Mutex::new(HashMap::new()),
                ack_timeout,
            }),
        }
    }

    /// Complete a pending `getDisplayMedia` request
    pub fn resolve_capture(&self, request_id: Uuid, outcome: CaptureOutcome) -> CaptureResult<()> {
        let sender = self.inner.pending.lock().remove(&request_id).ok_or_else(|| {
            CaptureError::Bridge(format!("No pending capture request {}", request_id))
        })?;

        if let CaptureOutcome::Granted { stream_id, .. } = &outcome {
            self.inner.streams.lock().insert(
                stream_id.clone(),
                StreamEntry {
                    active: true,
                    ..Default::default()
                },
            );
        }

        if let Err(outcome) = sender.send(outcome) {
            // The requester is gone; do not leave a granted stream running.
            if let CaptureOutcome::Granted { stream_id, .. } = outcome {
                tracing::warn!("Capture request {} abandoned, stopping {}", request_id, stream_id);
                self.inner.streams.lock().remove(&stream_id);
                let _ = self.inner.emit(BridgeRequest::StopTracks { stream_id });
            }
        }
        Ok(())
    }

    /// Route a recorder `dataavailable` payload to its session
    pub fn push_chunk(&self, stream_id: &str, data: Vec<u8>) {
        let sink = self
            .inner
            .streams
            .lock()
            .get(stream_id)
            .and_then(|entry| entry.sink.clone());

        match sink {
            Some(sink) => sink.deliver(data),
            None => tracing::debug!(
                "Dropping {} byte chunk for unknown stream {}",
                data.len(),
                stream_id
            ),
        }
    }

    /// The webview constructed and started a recorder, or failed to
    pub fn recorder_started(&self, stream_id: &str, result: Result<(), String>) {
        let sender = self
            .inner
            .streams
            .lock()
            .get_mut(stream_id)
            .and_then(|entry| entry.started_tx.take());

        match sender {
            Some(sender) => {
                let _ = sender.send(result);
            }
            None => tracing::debug!("Unexpected recorder start for stream {}", stream_id),
        }
    }

    /// The webview's recorder fired its `stop` event after its last upload.
    ///
    /// A recorder can stop on its own when the stream ends; that early
    /// acknowledgement is kept for the next stop request.
    pub fn recorder_stopped(&self, stream_id: &str) {
        let sender = {
            let mut streams = self.inner.streams.lock();
            let Some(entry) = streams.get_mut(stream_id) else {
                tracing::debug!("Recorder stop for unknown stream {}", stream_id);
                return;
            };
            match entry.stopped_tx.take() {
                Some(sender) => Some(sender),
                None => {
                    entry.recorder_stopped = true;
                    None
                }
            }
        };

        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    /// The stream went inactive in the webview (e.g. sharing revoked)
    pub fn stream_inactive(&self, stream_id: &str) {
        let sender = {
            let mut streams = self.inner.streams.lock();
            let Some(entry) = streams.get_mut(stream_id) else {
                tracing::debug!("Inactive event for unknown stream {}", stream_id);
                return;
            };
            entry.active = false;
            entry.inactive_tx.take()
        };

        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    /// Number of streams the backend still holds
    pub fn held_streams(&self) -> usize {
        self.inner.streams.lock().len()
    }
}

#[async_trait]
impl DisplayMediaSource for WebviewBridge {
    async fn get_display_media(
        &self,
        constraints: &CaptureConstraints,
    ) -> CaptureResult<Box<dyn CaptureStream>> {
        if !constraints.video {
            return Err(CaptureError::NotSupported(
                "screen capture requires a video track".to_string(),
            ));
        }

        let request_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(request_id, tx);

        let request = BridgeRequest::GetDisplayMedia {
            request_id,
            constraints: *constraints,
        };
        if let Err(e) = self.inner.emit(request) {
            self.inner.pending.lock().remove(&request_id);
            return Err(CaptureError::Bridge(e));
        }

        let outcome = rx
            .await
            .map_err(|_| CaptureError::Bridge("capture request was dropped".to_string()))?;

        match outcome {
            CaptureOutcome::Granted { stream_id, tracks } => {
                if !tracks.is_empty() && tracks.iter().all(|t| t.kind != TrackKind::Video) {
                    tracing::warn!("Stream {} was granted without a video track", stream_id);
                }
                Ok(Box::new(BridgeStream {
                    id: stream_id,
                    tracks,
                    inner: Arc::clone(&self.inner),
                }))
            }
            CaptureOutcome::Denied { reason } => Err(CaptureError::Denied(reason)),
        }
    }
}

#[async_trait]
impl RecorderFactory for WebviewBridge {
    async fn start(
        &self,
        stream: &dyn CaptureStream,
        options: &RecorderOptions,
        sink: ChunkSink,
    ) -> RecorderResult<Box<dyn MediaRecorder>> {
        check_options(options)?;

        let stream_id = stream.id().to_string();
        let (tx, rx) = oneshot::channel();
        {
            let mut streams = self.inner.streams.lock();
            let entry = streams
                .get_mut(&stream_id)
                .filter(|entry| entry.active)
                .ok_or_else(|| RecorderError::StreamInactive(stream_id.clone()))?;
            entry.sink = Some(sink);
            entry.started_tx = Some(tx);
            entry.recorder_stopped = false;
        }

        let request = BridgeRequest::StartRecorder {
            stream_id: stream_id.clone(),
            mime_type: options.mime_type.clone(),
            timeslice_ms: options.timeslice_ms,
        };
        if let Err(e) = self.inner.emit(request) {
            self.inner.detach_recorder(&stream_id);
            return Err(RecorderError::Bridge(e));
        }

        let failure = match tokio::time::timeout(self.inner.ack_timeout, rx).await {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(reason))) => Some(RecorderError::NotSupported(reason)),
            Ok(Err(_)) => Some(RecorderError::StreamInactive(stream_id.clone())),
            Err(_) => Some(RecorderError::Bridge(format!(
                "recorder for {} did not start within {:?}",
                stream_id, self.inner.ack_timeout
            ))),
        };
        if let Some(e) = failure {
            self.inner.detach_recorder(&stream_id);
            return Err(e);
        }

        tracing::info!(
            "Recorder started for stream {} ({}, {}ms timeslice)",
            stream_id,
            options.mime_type,
            options.timeslice_ms
        );
        Ok(Box::new(BridgeRecorder {
            stream_id,
            inner: Arc::clone(&self.inner),
            state: RecorderState::Recording,
        }))
    }
}

/// Capture stream living in the webview
struct BridgeStream {
    id: String,
    tracks: Vec<TrackInfo>,
    inner: Arc<BridgeInner>,
}

impl CaptureStream for BridgeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> &[TrackInfo] {
        &self.tracks
    }

    fn is_active(&self) -> bool {
        self.inner
            .streams
            .lock()
            .get(&self.id)
            .map(|entry| entry.active)
            .unwrap_or(false)
    }

    fn on_inactive(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut streams = self.inner.streams.lock();
        match streams.get_mut(&self.id) {
            Some(entry) if entry.active => entry.inactive_tx = Some(tx),
            _ => {
                let _ = tx.send(());
            }
        }
        rx
    }

    fn stop_tracks(&mut self) {
        let was_active = {
            let mut streams = self.inner.streams.lock();
            match streams.get_mut(&self.id) {
                Some(entry) if entry.active => {
                    entry.active = false;
                    // Stopping tracks ourselves is not an external end.
                    entry.inactive_tx = None;
                    true
                }
                _ => false,
            }
        };

        if was_active {
            if let Err(e) = self.inner.emit(BridgeRequest::StopTracks {
                stream_id: self.id.clone(),
            }) {
                tracing::warn!("Failed to stop tracks of {}: {}", self.id, e);
            }
        }
    }
}

impl Drop for BridgeStream {
    fn drop(&mut self) {
        self.inner.streams.lock().remove(&self.id);
    }
}

/// Recorder living in the webview
struct BridgeRecorder {
    stream_id: String,
    inner: Arc<BridgeInner>,
    state: RecorderState,
}

#[async_trait]
impl MediaRecorder for BridgeRecorder {
    fn state(&self) -> RecorderState {
        self.state
    }

    async fn stop(&mut self) -> RecorderResult<()> {
        if self.state == RecorderState::Inactive {
            return Ok(());
        }
        self.state = RecorderState::Inactive;

        let (tx, rx) = oneshot::channel();
        let wait = match self.inner.streams.lock().get_mut(&self.stream_id) {
            Some(entry) if entry.recorder_stopped => false,
            Some(entry) => {
                entry.stopped_tx = Some(tx);
                true
            }
            None => false,
        };

        self.inner
            .emit(BridgeRequest::StopRecorder {
                stream_id: self.stream_id.clone(),
            })
            .map_err(RecorderError::Bridge)?;

        if !wait {
            tracing::debug!("Recorder for {} had already stopped", self.stream_id);
            return Ok(());
        }
        match tokio::time::timeout(self.inner.ack_timeout, rx).await {
            Ok(_) => tracing::debug!("Recorder for {} stopped", self.stream_id),
            Err(_) => tracing::warn!(
                "Recorder for {} did not confirm stop within {:?}",
                self.stream_id,
                self.inner.ack_timeout
            ),
        }
        Ok(())
    }
}
