//! Screen sharing controller
//!
//! A single task owns the capture session, the recorder, the recording
//! buffer and the current artifact. User clicks and platform notifications
//! arrive as messages on one inbox and go through the same transition table,
//! so no locks guard the state and ordering is inbox order.

use super::buffer::RecordingBuffer;
use super::media::{ChunkSink, MediaRecorder, RecorderFactory};
use super::state::{ButtonState, Trigger, UiState};
use crate::capture::{CaptureError, CaptureResult, CaptureSession, CaptureStream, DisplayMediaSource};
use crate::config::ScreenSharingConfig;
use crate::export::{self, Artifact, ArtifactStore, DownloadTrigger};
use crate::utils::error::ScreenSharingError;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

/// Event name the frontend listens on for controller events
pub const STATE_EVENT: &str = "screen-sharing://state";

/// Host platform services used by the controller
#[derive(Clone)]
pub struct Platform {
    pub display_media: Arc<dyn DisplayMediaSource>,
    pub recorders: Arc<dyn RecorderFactory>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub downloads: Arc<dyn DownloadTrigger>,
}

/// Serializable view of the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub state: UiState,
    pub buttons: ButtonState,
    pub session_id: Option<Uuid>,
    pub stream_id: Option<String>,
    pub chunk_count: usize,
    pub buffered_bytes: usize,
    pub artifact: Option<Artifact>,
}

/// Result of a download click
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    pub artifact: Artifact,
    pub saved_to: PathBuf,
}

/// Events emitted by the controller
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ScreenSharingEvent {
    /// The state or button record changed
    StateChanged(Snapshot),
    /// A new artifact was exported and downloaded
    ArtifactReady(DownloadOutcome),
    /// Something failed and the user should know
    Error(String),
}

type Reply<T> = oneshot::Sender<Result<T, ScreenSharingError>>;

enum Command {
    Start {
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    Download {
        reply: Reply<DownloadOutcome>,
    },
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
    CaptureResolved {
        session: Uuid,
        result: CaptureResult<Box<dyn CaptureStream>>,
    },
    Chunk {
        session: Uuid,
        data: Vec<u8>,
    },
    StreamEnded {
        session: Uuid,
    },
}

enum Phase {
    Idle,
    /// Waiting for the platform to grant or deny capture
    Acquiring {
        session: Uuid,
        reply: Option<Reply<()>>,
    },
    Recording {
        session: Uuid,
        recorder: Box<dyn MediaRecorder>,
    },
    Finished {
        session: Uuid,
    },
}

impl Phase {
    fn ui_state(&self) -> UiState {
        match self {
            Phase::Idle => UiState::Idle,
            Phase::Acquiring { .. } | Phase::Recording { .. } => UiState::Recording,
            Phase::Finished { .. } => UiState::Finished,
        }
    }

    fn session(&self) -> Option<Uuid> {
        match self {
            Phase::Idle => None,
            Phase::Acquiring { session, .. }
            | Phase::Recording { session, .. }
            | Phase::Finished { session } => Some(*session),
        }
    }
}

/// Handle to the screen sharing controller
///
/// Cheap to clone. The controller task exits once every handle is dropped.
#[derive(Clone)]
pub struct ScreenSharing {
    inbox: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ScreenSharingEvent>,
    buttons: Arc<RwLock<ButtonState>>,
}

impl ScreenSharing {
    /// Spawn the controller on the current tokio runtime
    pub fn spawn(platform: Platform, config: ScreenSharingConfig) -> Self {
        let (inbox, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(100);
        let buttons = Arc::new(RwLock::new(ButtonState::default()));

        let controller = Controller {
            capture: CaptureSession::new(Arc::clone(&platform.display_media), config.constraints()),
            platform,
            config,
            phase: Phase::Idle,
            buffer: RecordingBuffer::new(),
            artifact: None,
            inbox: inbox.downgrade(),
            events: events.clone(),
            buttons: Arc::clone(&buttons),
        };
        tokio::spawn(controller.run(rx));

        Self {
            inbox,
            events,
            buttons,
        }
    }

    /// Click Start. Resolves once the platform grants or denies capture.
    pub async fn start(&self) -> Result<(), ScreenSharingError> {
        self.request(|reply| Command::Start { reply }).await?
    }

    /// Click Stop. Stopping a session that already ended is a no-op.
    pub async fn stop(&self) -> Result<(), ScreenSharingError> {
        self.request(|reply| Command::Stop { reply }).await?
    }

    /// Click Download
    pub async fn download(&self) -> Result<DownloadOutcome, ScreenSharingError> {
        self.request(|reply| Command::Download { reply }).await?
    }

    pub async fn snapshot(&self) -> Result<Snapshot, ScreenSharingError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Latest button record
    pub fn buttons(&self) -> ButtonState {
        *self.buttons.read()
    }

    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<ScreenSharingEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ScreenSharingError> {
        let (tx, rx) = oneshot::channel();
        self.inbox
            .send(command(tx))
            .map_err(|_| ScreenSharingError::ControllerGone)?;
        rx.await.map_err(|_| ScreenSharingError::ControllerGone)
    }
}

struct Controller {
    platform: Platform,
    config: ScreenSharingConfig,
    capture: CaptureSession,
    phase: Phase,
    buffer: RecordingBuffer,
    artifact: Option<Artifact>,
    inbox: mpsc::WeakUnboundedSender<Command>,
    events: broadcast::Sender<ScreenSharingEvent>,
    buttons: Arc<RwLock<ButtonState>>,
}

impl Controller {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!("Screen sharing controller started");

        while let Some(command) = rx.recv().await {
            match command {
                Command::Start { reply } => self.handle_start(reply),
                Command::Stop { reply } => {
                    self.handle_stop().await;
                    let _ = reply.send(Ok(()));
                }
                Command::Download { reply } => {
                    let _ = reply.send(self.handle_download());
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                Command::CaptureResolved { session, result } => {
                    self.handle_capture_resolved(session, result).await
                }
                Command::Chunk { session, data } => self.handle_chunk(session, data),
                Command::StreamEnded { session } => self.handle_stream_ended(session).await,
            }
        }

        self.finish(Trigger::Stop).await;
        self.revoke_artifact();
        tracing::debug!("Screen sharing controller stopped");
    }

    fn ui_state(&self) -> UiState {
        self.phase.ui_state()
    }

    /// Replace the phase, following the transition table row for `trigger`.
    ///
    /// Returns the previous phase.
    fn enter(&mut self, trigger: Trigger, phase: Phase) -> Phase {
        let from = self.ui_state();
        let to = phase.ui_state();
        let allowed = from.next(trigger) == Some(to);
        debug_assert!(allowed, "{:?} --{}--> {:?} is not in the transition table", from, trigger, to);
        if !allowed {
            tracing::error!("Transition {:?} --{}--> {:?} is not in the table", from, trigger, to);
        }
        std::mem::replace(&mut self.phase, phase)
    }

    fn snapshot(&self) -> Snapshot {
        let state = self.ui_state();
        Snapshot {
            state,
            buttons: state.buttons(),
            session_id: self.phase.session(),
            stream_id: self.capture.stream().map(|s| s.id().to_string()),
            chunk_count: self.buffer.len(),
            buffered_bytes: self.buffer.total_bytes(),
            artifact: self.artifact.clone(),
        }
    }

    fn publish_state(&self) {
        let snapshot = self.snapshot();
        *self.buttons.write() = snapshot.buttons;
        let _ = self.events.send(ScreenSharingEvent::StateChanged(snapshot));
    }

    fn report(&self, error: &ScreenSharingError) {
        let _ = self.events.send(ScreenSharingEvent::Error(error.to_string()));
    }

    fn handle_start(&mut self, reply: Reply<()>) {
        if !self.ui_state().accepts(Trigger::Start) {
            let _ = reply.send(Err(ScreenSharingError::ButtonDisabled(Trigger::Start)));
            return;
        }

        tracing::info!("Start capturing");
        self.revoke_artifact();
        self.buffer.clear();

        let session = Uuid::new_v4();
        self.enter(
            Trigger::Start,
            Phase::Acquiring {
                session,
                reply: Some(reply),
            },
        );
        self.publish_state();

        let acquire = self.capture.acquire();
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = acquire.await;
            match inbox.upgrade() {
                Some(inbox) => {
                    let _ = inbox.send(Command::CaptureResolved { session, result });
                }
                None => {
                    if let Ok(mut stream) = result {
                        stream.stop_tracks();
                    }
                }
            }
        });
    }

    async fn handle_capture_resolved(
        &mut self,
        session: Uuid,
        result: CaptureResult<Box<dyn CaptureStream>>,
    ) {
        let reply = match &mut self.phase {
            Phase::Acquiring {
                session: current,
                reply,
            } if *current == session => reply.take(),
            _ => {
                tracing::debug!("Discarding capture result for stale session {}", session);
                if let Ok(mut stream) = result {
                    stream.stop_tracks();
                }
                return;
            }
        };

        let outcome = self.begin_recording(session, result).await;
        if let Err(e) = &outcome {
            tracing::warn!("Could not start recording: {}", e);
            self.capture.release();
            self.enter(Trigger::CaptureFailed, Phase::Idle);
            self.report(e);
        }
        self.publish_state();

        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }

    async fn begin_recording(
        &mut self,
        session: Uuid,
        result: CaptureResult<Box<dyn CaptureStream>>,
    ) -> Result<(), ScreenSharingError> {
        let ended = self.capture.adopt(result?);

        let stream = self
            .capture
            .stream()
            .ok_or_else(|| CaptureError::Ended("stream released before recording".to_string()))?;
        let options = self.config.recorder_options();
        let recorder = self
            .platform
            .recorders
            .start(stream, &options, self.chunk_sink(session))
            .await?;

        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            // An error means the stream was released first.
            if ended.await.is_ok() {
                if let Some(inbox) = inbox.upgrade() {
                    let _ = inbox.send(Command::StreamEnded { session });
                }
            }
        });

        self.enter(Trigger::CaptureGranted, Phase::Recording { session, recorder });
        Ok(())
    }

    fn chunk_sink(&self, session: Uuid) -> ChunkSink {
        let inbox = self.inbox.clone();
        ChunkSink::new(move |data| {
            if let Some(inbox) = inbox.upgrade() {
                let _ = inbox.send(Command::Chunk { session, data });
            }
        })
    }

    fn handle_chunk(&mut self, session: Uuid, data: Vec<u8>) {
        let current = match &self.phase {
            Phase::Recording { session, .. } | Phase::Finished { session } => Some(*session),
            _ => None,
        };
        if current != Some(session) {
            tracing::debug!("Dropping {} byte chunk from stale session", data.len());
            return;
        }

        let size = data.len();
        if self.buffer.push(data) {
            tracing::trace!("Buffered {} byte chunk ({} total)", size, self.buffer.total_bytes());
        } else {
            tracing::trace!("Dropping empty chunk");
        }
    }

    async fn handle_stop(&mut self) {
        if let Phase::Acquiring { session, reply } = &mut self.phase {
            tracing::info!("Stop capturing before capture was granted");
            let session = *session;
            if let Some(reply) = reply.take() {
                let _ = reply.send(Err(ScreenSharingError::Cancelled));
            }
            self.enter(Trigger::Stop, Phase::Finished { session });
            self.publish_state();
            return;
        }

        if matches!(self.phase, Phase::Recording { .. }) {
            tracing::info!("Stop capturing");
            self.finish(Trigger::Stop).await;
        } else {
            tracing::debug!("Stop ignored, no live session");
        }
    }

    async fn handle_stream_ended(&mut self, session: Uuid) {
        let live = matches!(
            &self.phase,
            Phase::Recording { session: current, .. } if *current == session
        );
        if live {
            tracing::info!("Capture stream inactive, stop recording");
            self.finish(Trigger::StreamEnded).await;
        } else {
            tracing::debug!("Ignoring end of session {}", session);
        }
    }

    /// Stop the recorder, release the stream, and enter Finished.
    ///
    /// Does nothing unless a recording is live.
    async fn finish(&mut self, trigger: Trigger) {
        let session = match &self.phase {
            Phase::Recording { session, .. } => *session,
            _ => return,
        };

        if let Phase::Recording { mut recorder, .. } =
            self.enter(trigger, Phase::Finished { session })
        {
            if let Err(e) = recorder.stop().await {
                tracing::warn!("Recorder stop failed: {}", e);
            }
        }
        self.capture.release();

        tracing::info!(
            "Recording finished: {} chunk(s), {} bytes over {} ms",
            self.buffer.len(),
            self.buffer.total_bytes(),
            self.buffer.span_ms()
        );
        self.publish_state();
    }

    fn handle_download(&mut self) -> Result<DownloadOutcome, ScreenSharingError> {
        if !self.ui_state().accepts(Trigger::Download) {
            return Err(ScreenSharingError::ButtonDisabled(Trigger::Download));
        }

        tracing::info!("Download recording");
        let outcome = self.export();
        match &outcome {
            Ok(outcome) => {
                let _ = self
                    .events
                    .send(ScreenSharingEvent::ArtifactReady(outcome.clone()));
            }
            Err(e) => {
                tracing::error!("Download failed: {}", e);
                self.report(e);
            }
        }
        self.publish_state();
        outcome
    }

    fn export(&mut self) -> Result<DownloadOutcome, ScreenSharingError> {
        let blob = export::materialize(&self.buffer, &self.config.mime_type);

        // At most one live reference: drop the previous one first.
        self.revoke_artifact();
        let url = self.platform.artifacts.create_object_url(&blob)?;
        let artifact = Artifact {
            url,
            size: blob.size(),
            mime_type: blob.mime_type().to_string(),
            filename: self.config.download_filename.clone(),
            created_at: Utc::now(),
        };
        self.artifact = Some(artifact.clone());

        let saved_to = self.platform.downloads.click(&artifact.link())?;
        Ok(DownloadOutcome { artifact, saved_to })
    }

    fn revoke_artifact(&mut self) {
        if let Some(artifact) = self.artifact.take() {
            if let Err(e) = self.platform.artifacts.revoke_object_url(&artifact.url) {
                tracing::warn!("Failed to revoke {}: {}", artifact.url, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderError;
    use crate::capture::{BridgeEmitter, BridgeRequest, CaptureOutcome, TrackInfo, TrackKind, WebviewBridge};
    use crate::export::{DirectoryDownloader, DownloadLink, ExportError, ExportResult, FileArtifactStore};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Drives the bridge the way the webview would
    struct Webview {
        bridge: WebviewBridge,
        requests: mpsc::UnboundedReceiver<BridgeRequest>,
    }

    impl Webview {
        async fn next(&mut self) -> BridgeRequest {
            tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
                .await
                .expect("timed out waiting for a bridge request")
                .expect("bridge closed")
        }

        async fn grant(&mut self, stream_id: &str) {
            let BridgeRequest::GetDisplayMedia { request_id, constraints } = self.next().await else {
                panic!("expected getDisplayMedia");
            };
            assert!(constraints.video);
            assert!(!constraints.audio);
            self.bridge
                .resolve_capture(
                    request_id,
                    CaptureOutcome::Granted {
                        stream_id: stream_id.to_string(),
                        tracks: vec![TrackInfo {
                            id: format!("{}-video", stream_id),
                            kind: TrackKind::Video,
                            label: "screen:0:0".to_string(),
                        }],
                    },
                )
                .unwrap();
        }

        async fn deny(&mut self) {
            let BridgeRequest::GetDisplayMedia { request_id, .. } = self.next().await else {
                panic!("expected getDisplayMedia");
            };
            self.bridge
                .resolve_capture(
                    request_id,
                    CaptureOutcome::Denied {
                        reason: "NotAllowedError: Permission denied".to_string(),
                    },
                )
                .unwrap();
        }

        async fn expect_start_recorder(&mut self, stream_id: &str) {
            assert_eq!(
                self.next().await,
                BridgeRequest::StartRecorder {
                    stream_id: stream_id.to_string(),
                    mime_type: "video/webm".to_string(),
                    timeslice_ms: 10,
                }
            );
        }

        /// Construct and start the recorder
        async fn accept_recorder(&mut self, stream_id: &str) {
            self.expect_start_recorder(stream_id).await;
            self.bridge.recorder_started(stream_id, Ok(()));
        }

        /// Answer the stop sequence: recorder stop (with a final flush), then tracks
        async fn acknowledge_stop(&mut self, stream_id: &str, final_chunk: Option<usize>) {
            assert_eq!(
                self.next().await,
                BridgeRequest::StopRecorder {
                    stream_id: stream_id.to_string()
                }
            );
            if let Some(size) = final_chunk {
                self.bridge.push_chunk(stream_id, vec![0xEE; size]);
            }
            self.bridge.recorder_stopped(stream_id);
        }
    }

    struct Harness {
        sharing: ScreenSharing,
        webview: Webview,
        store: Arc<FileArtifactStore>,
        downloads: TempDir,
    }

    fn harness() -> Harness {
        harness_with(ScreenSharingConfig::default())
    }

    fn harness_with(config: ScreenSharingConfig) -> Harness {
        let (tx, requests) = mpsc::unbounded_channel();
        let emitter: BridgeEmitter = Arc::new(move |request: BridgeRequest| {
            tx.send(request).map_err(|e| e.to_string())
        });
        let bridge = WebviewBridge::new(emitter, Duration::from_secs(5));
        let store = Arc::new(FileArtifactStore::new().unwrap());
        let downloads = tempfile::tempdir().unwrap();
        let platform = Platform {
            display_media: Arc::new(bridge.clone()),
            recorders: Arc::new(bridge.clone()),
            artifacts: store.clone(),
            downloads: Arc::new(DirectoryDownloader::new(
                store.clone(),
                downloads.path().to_path_buf(),
            )),
        };
        Harness {
            sharing: ScreenSharing::spawn(platform, config),
            webview: Webview { bridge, requests },
            store,
            downloads,
        }
    }

    impl Harness {
        async fn start_recording(&mut self, stream_id: &str) {
            let sharing = self.sharing.clone();
            let start = tokio::spawn(async move { sharing.start().await });
            self.webview.grant(stream_id).await;
            self.webview.accept_recorder(stream_id).await;
            start.await.unwrap().unwrap();
        }

        async fn stop_recording(&mut self, stream_id: &str, final_chunk: Option<usize>) {
            let sharing = self.sharing.clone();
            let stop = tokio::spawn(async move { sharing.stop().await });
            self.webview.acknowledge_stop(stream_id, final_chunk).await;
            stop.await.unwrap().unwrap();
            assert_eq!(
                self.webview.next().await,
                BridgeRequest::StopTracks {
                    stream_id: stream_id.to_string()
                }
            );
        }

        async fn state(&self) -> Snapshot {
            self.sharing.snapshot().await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_record_and_download_scenario() {
        let mut h = harness();
        assert_eq!(h.state().await.state, UiState::Idle);

        h.start_recording("s1").await;
        let snapshot = h.state().await;
        assert_eq!(snapshot.state, UiState::Recording);
        assert_eq!(snapshot.stream_id.as_deref(), Some("s1"));
        assert_eq!(h.sharing.buttons(), UiState::Recording.buttons());

        h.webview.bridge.push_chunk("s1", vec![1; 100]);
        h.webview.bridge.push_chunk("s1", Vec::new());
        h.webview.bridge.push_chunk("s1", vec![2; 200]);

        h.stop_recording("s1", None).await;
        let snapshot = h.state().await;
        assert_eq!(snapshot.state, UiState::Finished);
        assert_eq!(snapshot.chunk_count, 2);
        assert_eq!(snapshot.buffered_bytes, 300);
        assert_eq!(snapshot.stream_id, None);
        assert_eq!(h.webview.bridge.held_streams(), 0);

        let outcome = h.sharing.download().await.unwrap();
        assert_eq!(outcome.artifact.size, 300);
        assert_eq!(outcome.artifact.filename, "screen-recording.webm");
        assert_eq!(outcome.artifact.mime_type, "video/webm");
        assert_eq!(outcome.saved_to, h.downloads.path().join("screen-recording.webm"));

        let saved = std::fs::read(&outcome.saved_to).unwrap();
        assert_eq!(saved.len(), 300);
        assert!(saved[..100].iter().all(|b| *b == 1));
        assert!(saved[100..].iter().all(|b| *b == 2));

        let snapshot = h.state().await;
        assert_eq!(snapshot.state, UiState::Finished);
        assert_eq!(snapshot.artifact, Some(outcome.artifact));
    }

    #[tokio::test]
    async fn test_denied_capture_returns_to_idle() {
        let mut h = harness();
        let mut events = h.sharing.subscribe();

        let sharing = h.sharing.clone();
        let start = tokio::spawn(async move { sharing.start().await });
        h.webview.deny().await;

        let result = start.await.unwrap();
        assert!(matches!(
            result,
            Err(ScreenSharingError::Capture(CaptureError::Denied(_)))
        ));

        let snapshot = h.state().await;
        assert_eq!(snapshot.state, UiState::Idle);
        assert!(snapshot.buttons.start_enabled);
        assert_eq!(snapshot.stream_id, None);
        assert_eq!(h.webview.bridge.held_streams(), 0);
        assert!(h.webview.requests.try_recv().is_err());

        let mut saw_error = false;
        while let Ok(event) = events.try_recv() {
            if let ScreenSharingEvent::Error(message) = event {
                assert!(message.contains("Permission denied"));
                saw_error = true;
            }
        }
        assert!(saw_error);

        // A fresh attempt is possible right away.
        h.start_recording("s2").await;
        assert_eq!(h.state().await.state, UiState::Recording);
    }

    #[tokio::test]
    async fn test_recorder_failure_returns_to_idle() {
        let mut h = harness_with(ScreenSharingConfig {
            mime_type: "application/x-unsupported".to_string(),
            ..Default::default()
        });

        let sharing = h.sharing.clone();
        let start = tokio::spawn(async move { sharing.start().await });
        h.webview.grant("s1").await;

        let result = start.await.unwrap();
        assert!(matches!(result, Err(ScreenSharingError::Recorder(_))));
        assert_eq!(
            h.webview.next().await,
            BridgeRequest::StopTracks {
                stream_id: "s1".to_string()
            }
        );

        let snapshot = h.state().await;
        assert_eq!(snapshot.state, UiState::Idle);
        assert_eq!(h.webview.bridge.held_streams(), 0);
    }

    #[tokio::test]
    async fn test_webview_recorder_failure_returns_to_idle() {
        let mut h = harness();
        let mut events = h.sharing.subscribe();

        let sharing = h.sharing.clone();
        let start = tokio::spawn(async move { sharing.start().await });
        h.webview.grant("s1").await;
        h.webview.expect_start_recorder("s1").await;
        h.webview.bridge.recorder_started(
            "s1",
            Err("NotSupportedError: Failed to construct 'MediaRecorder'".to_string()),
        );

        let result = start.await.unwrap();
        assert!(matches!(
            result,
            Err(ScreenSharingError::Recorder(RecorderError::NotSupported(_)))
        ));
        assert_eq!(
            h.webview.next().await,
            BridgeRequest::StopTracks {
                stream_id: "s1".to_string()
            }
        );

        let snapshot = h.state().await;
        assert_eq!(snapshot.state, UiState::Idle);
        assert_eq!(snapshot.buttons, UiState::Idle.buttons());
        assert_eq!(snapshot.stream_id, None);
        assert_eq!(h.webview.bridge.held_streams(), 0);

        let reported = std::iter::from_fn(|| events.try_recv().ok())
            .any(|event| matches!(event, ScreenSharingEvent::Error(m) if m.contains("NotSupportedError")));
        assert!(reported);
        assert!(matches!(
            h.sharing.download().await,
            Err(ScreenSharingError::ButtonDisabled(Trigger::Download))
        ));
    }

    #[tokio::test]
    async fn test_external_end_keeps_final_chunk() {
        let mut h = harness();
        h.start_recording("s1").await;
        h.webview.bridge.push_chunk("s1", vec![1; 100]);

        // Sharing ends in the platform UI: the recorder flushes its tail and
        // reports stop on its own before the stream's inactive event.
        h.webview.bridge.push_chunk("s1", vec![2; 40]);
        h.webview.bridge.recorder_stopped("s1");
        h.webview.bridge.stream_inactive("s1");

        assert_eq!(
            h.webview.next().await,
            BridgeRequest::StopRecorder {
                stream_id: "s1".to_string()
            }
        );
        let snapshot = tokio::time::timeout(Duration::from_secs(1), h.state())
            .await
            .expect("finish waited for a stop that was already reported");
        assert_eq!(snapshot.state, UiState::Finished);
        assert_eq!(snapshot.chunk_count, 2);
        assert_eq!(snapshot.buffered_bytes, 140);
        assert!(h.webview.requests.try_recv().is_err());

        let outcome = h.sharing.download().await.unwrap();
        assert_eq!(outcome.artifact.size, 140);
    }

    #[tokio::test]
    async fn test_external_end_finishes_once() {
        let mut h = harness();
        let mut events = h.sharing.subscribe();
        h.start_recording("s1").await;
        h.webview.bridge.push_chunk("s1", vec![3; 50]);

        // Sharing revoked from the platform UI while the user clicks Stop.
        h.webview.bridge.stream_inactive("s1");
        let sharing = h.sharing.clone();
        let stop = tokio::spawn(async move { sharing.stop().await });

        h.webview.acknowledge_stop("s1", Some(25)).await;
        stop.await.unwrap().unwrap();
        h.sharing.stop().await.unwrap();

        let snapshot = h.state().await;
        assert_eq!(snapshot.state, UiState::Finished);
        assert_eq!(snapshot.buffered_bytes, 75);

        // Tracks were already stopped externally and only one recorder stop went out.
        assert!(h.webview.requests.try_recv().is_err());

        let finished = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|event| {
                matches!(event, ScreenSharingEvent::StateChanged(s) if s.state == UiState::Finished)
            })
            .count();
        assert_eq!(finished, 1);
    }

    #[tokio::test]
    async fn test_new_session_clears_buffer() {
        let mut h = harness();
        h.start_recording("s1").await;
        h.webview.bridge.push_chunk("s1", vec![1; 400]);
        h.stop_recording("s1", None).await;
        h.sharing.download().await.unwrap();

        h.start_recording("s2").await;
        let snapshot = h.state().await;
        assert_eq!(snapshot.chunk_count, 0);
        assert_eq!(snapshot.artifact, None);
        assert_eq!(h.store.live_count(), 0);

        // A late chunk from the previous stream must not leak in.
        h.webview.bridge.push_chunk("s1", vec![9; 999]);
        h.webview.bridge.push_chunk("s2", vec![2; 10]);
        h.stop_recording("s2", Some(5)).await;

        let outcome = h.sharing.download().await.unwrap();
        assert_eq!(outcome.artifact.size, 15);
    }

    #[tokio::test]
    async fn test_repeated_download_keeps_one_live_url() {
        let mut h = harness();
        h.start_recording("s1").await;
        h.webview.bridge.push_chunk("s1", vec![1; 10]);
        h.stop_recording("s1", None).await;

        let first = h.sharing.download().await.unwrap();
        assert_eq!(h.store.live_count(), 1);
        let second = h.sharing.download().await.unwrap();
        assert_eq!(h.store.live_count(), 1);

        assert_ne!(first.artifact.url, second.artifact.url);
        assert!(h.store.resolve(&first.artifact.url).is_none());
        assert!(h.store.resolve(&second.artifact.url).is_some());
        assert_eq!(
            second.saved_to,
            h.downloads.path().join("screen-recording (1).webm")
        );
    }

    #[tokio::test]
    async fn test_disabled_buttons_are_rejected() {
        let mut h = harness();
        assert!(matches!(
            h.sharing.download().await,
            Err(ScreenSharingError::ButtonDisabled(Trigger::Download))
        ));
        h.sharing.stop().await.unwrap();
        assert_eq!(h.state().await.state, UiState::Idle);

        h.start_recording("s1").await;
        assert!(matches!(
            h.sharing.start().await,
            Err(ScreenSharingError::ButtonDisabled(Trigger::Start))
        ));
        assert!(matches!(
            h.sharing.download().await,
            Err(ScreenSharingError::ButtonDisabled(Trigger::Download))
        ));
        assert_eq!(h.state().await.state, UiState::Recording);
    }

    #[tokio::test]
    async fn test_stop_while_acquiring_cancels_session() {
        let mut h = harness();
        let sharing = h.sharing.clone();
        let start = tokio::spawn(async move { sharing.start().await });

        let BridgeRequest::GetDisplayMedia { request_id, .. } = h.webview.next().await else {
            panic!("expected getDisplayMedia");
        };
        h.sharing.stop().await.unwrap();
        assert!(matches!(
            start.await.unwrap(),
            Err(ScreenSharingError::Cancelled)
        ));
        assert_eq!(h.state().await.state, UiState::Finished);

        // The late grant is released immediately.
        h.webview
            .bridge
            .resolve_capture(
                request_id,
                CaptureOutcome::Granted {
                    stream_id: "late".to_string(),
                    tracks: Vec::new(),
                },
            )
            .unwrap();
        assert_eq!(
            h.webview.next().await,
            BridgeRequest::StopTracks {
                stream_id: "late".to_string()
            }
        );
        assert_eq!(h.state().await.state, UiState::Finished);
        assert_eq!(h.webview.bridge.held_streams(), 0);
    }

    #[tokio::test]
    async fn test_buttons_follow_every_transition() {
        let mut h = harness();
        let mut events = h.sharing.subscribe();

        h.start_recording("s1").await;
        h.stop_recording("s1", Some(1)).await;
        h.sharing.download().await.unwrap();
        h.start_recording("s2").await;
        h.webview.bridge.stream_inactive("s2");
        h.webview.acknowledge_stop("s2", None).await;
        assert_eq!(h.state().await.state, UiState::Finished);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ScreenSharingEvent::StateChanged(snapshot) = event {
                assert_eq!(snapshot.buttons.enabled_count(), 1);
                assert_eq!(snapshot.buttons, snapshot.state.buttons());
                seen.push(snapshot.state);
            }
        }
        assert_eq!(
            seen,
            vec![
                UiState::Recording,
                UiState::Recording,
                UiState::Finished,
                UiState::Finished,
                UiState::Recording,
                UiState::Recording,
                UiState::Finished,
            ]
        );
    }

    struct FailingDownloads;

    impl DownloadTrigger for FailingDownloads {
        fn click(&self, _link: &DownloadLink) -> ExportResult<PathBuf> {
            Err(ExportError::Download("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_download_stays_finished() {
        let (tx, requests) = mpsc::unbounded_channel();
        let emitter: BridgeEmitter = Arc::new(move |request: BridgeRequest| {
            tx.send(request).map_err(|e| e.to_string())
        });
        let bridge = WebviewBridge::new(emitter, Duration::from_secs(5));
        let store = Arc::new(FileArtifactStore::new().unwrap());
        let platform = Platform {
            display_media: Arc::new(bridge.clone()),
            recorders: Arc::new(bridge.clone()),
            artifacts: store.clone(),
            downloads: Arc::new(FailingDownloads),
        };
        let mut h = Harness {
            sharing: ScreenSharing::spawn(platform, ScreenSharingConfig::default()),
            webview: Webview { bridge, requests },
            store,
            downloads: tempfile::tempdir().unwrap(),
        };

        h.start_recording("s1").await;
        h.stop_recording("s1", Some(8)).await;
        assert!(matches!(
            h.sharing.download().await,
            Err(ScreenSharingError::Export(_))
        ));
        assert_eq!(h.state().await.state, UiState::Finished);
        assert!(h.sharing.buttons().download_enabled);

        // The failed artifact is still released on the next attempt.
        let first = h.state().await.artifact.unwrap();
        let _ = h.sharing.download().await;
        assert_eq!(h.store.live_count(), 1);
        assert!(h.store.resolve(&first.url).is_none());
    }

    #[tokio::test]
    async fn test_dropping_handles_tears_down_session() {
        let mut h = harness();
        h.start_recording("s1").await;

        let Harness {
            sharing,
            mut webview,
            store,
            downloads: _downloads,
        } = h;
        drop(sharing);

        webview.acknowledge_stop("s1", None).await;
        assert_eq!(
            webview.next().await,
            BridgeRequest::StopTracks {
                stream_id: "s1".to_string()
            }
        );
        assert_eq!(store.live_count(), 0);
    }
}
