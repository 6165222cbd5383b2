//! Screen sharing Tauri commands
//!
//! The three button commands drive the controller. The bridge commands are
//! how the webview reports results of the media calls it was asked to make.

use crate::capture::{CaptureOutcome, WebviewBridge};
use crate::recorder::{DownloadOutcome, ScreenSharing, Snapshot};
use crate::utils::error::{AppError, AppResult, ErrorResponse, ScreenSharingError};
use tauri::ipc::{InvokeBody, Request};
use tauri::State;
use uuid::Uuid;

/// Header carrying the stream id of a raw recorder chunk
pub const STREAM_ID_HEADER: &str = "stream-id";

/// Application state for screen sharing
pub struct ScreenSharingState {
    pub sharing: ScreenSharing,
    pub bridge: WebviewBridge,
}

fn respond(error: ScreenSharingError) -> ErrorResponse {
    ErrorResponse::from(AppError::from(error))
}

/// Start screen capture and recording
#[tauri::command]
pub async fn start_capturing(state: State<'_, ScreenSharingState>) -> Result<Snapshot, ErrorResponse> {
    state.sharing.start().await.map_err(respond)?;
    state.sharing.snapshot().await.map_err(respond)
}

/// Stop screen capture
#[tauri::command]
pub async fn stop_capturing(state: State<'_, ScreenSharingState>) -> Result<Snapshot, ErrorResponse> {
    state.sharing.stop().await.map_err(respond)?;
    state.sharing.snapshot().await.map_err(respond)
}

/// Export the recording and save it to the downloads directory
#[tauri::command]
pub async fn download_recording(
    state: State<'_, ScreenSharingState>,
) -> Result<DownloadOutcome, ErrorResponse> {
    state.sharing.download().await.map_err(respond)
}

/// Get the current state and button record
#[tauri::command]
pub async fn get_screen_sharing_state(
    state: State<'_, ScreenSharingState>,
) -> Result<Snapshot, ErrorResponse> {
    state.sharing.snapshot().await.map_err(respond)
}

/// `getDisplayMedia` settled in the webview
#[tauri::command]
pub fn capture_resolved(
    state: State<'_, ScreenSharingState>,
    request_id: Uuid,
    outcome: CaptureOutcome,
) -> Result<(), ErrorResponse> {
    state
        .bridge
        .resolve_capture(request_id, outcome)
        .map_err(|e| respond(e.into()))
}

/// Recorder constructed and started in the webview, or `error` when it could not be
#[tauri::command]
pub fn recorder_started(
    state: State<'_, ScreenSharingState>,
    stream_id: String,
    error: Option<String>,
) {
    if let Some(reason) = &error {
        tracing::warn!("Recorder for {} failed to start: {}", stream_id, reason);
    }
    state
        .bridge
        .recorder_started(&stream_id, error.map_or(Ok(()), Err));
}

/// Recorder `dataavailable` in the webview, sent as a raw body
#[tauri::command]
pub fn recorder_data(
    state: State<'_, ScreenSharingState>,
    request: Request<'_>,
) -> Result<(), ErrorResponse> {
    let stream_id = request
        .headers()
        .get(STREAM_ID_HEADER)
        .and_then(|value| value.to_str().ok());
    let (stream_id, data) = read_chunk(stream_id, request.body())?;
    state.bridge.push_chunk(&stream_id, data);
    Ok(())
}

fn read_chunk(stream_id: Option<&str>, body: &InvokeBody) -> AppResult<(String, Vec<u8>)> {
    let stream_id = stream_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Bridge(format!("missing {} header", STREAM_ID_HEADER)))?;
    match body {
        InvokeBody::Raw(data) => Ok((stream_id.to_string(), data.clone())),
        _ => Err(AppError::Bridge(
            "recorder data must be sent as raw bytes".to_string(),
        )),
    }
}

/// Recorder `stop` in the webview
#[tauri::command]
pub fn recorder_stopped(state: State<'_, ScreenSharingState>, stream_id: String) {
    state.bridge.recorder_stopped(&stream_id);
}

/// Capture stream `inactive` in the webview
#[tauri::command]
pub fn capture_inactive(state: State<'_, ScreenSharingState>, stream_id: String) {
    tracing::info!("Capture stream {} inactive", stream_id);
    state.bridge.stream_inactive(&stream_id);
}
