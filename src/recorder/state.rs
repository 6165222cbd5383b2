//! UI state management
//!
//! Defines the widget state machine and the button record derived from it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current state of the widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiState {
    /// Nothing captured yet, Start is available
    Idle,
    /// A capture session is live (or being negotiated)
    Recording,
    /// Recording stopped, the buffer can be downloaded
    Finished,
}

impl Default for UiState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Inputs that drive the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Trigger {
    /// User clicked Start
    Start,
    /// User clicked Stop
    Stop,
    /// The capture stream ended outside the widget's control
    StreamEnded,
    /// User clicked Download
    Download,
    /// Capture was granted and the recorder is running
    CaptureGranted,
    /// Capture was denied or the recorder could not be constructed
    CaptureFailed,
}

impl Trigger {
    pub const ALL: [Trigger; 6] = [
        Trigger::Start,
        Trigger::Stop,
        Trigger::StreamEnded,
        Trigger::Download,
        Trigger::CaptureGranted,
        Trigger::CaptureFailed,
    ];
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Start => write!(f, "start"),
            Trigger::Stop => write!(f, "stop"),
            Trigger::StreamEnded => write!(f, "stream-ended"),
            Trigger::Download => write!(f, "download"),
            Trigger::CaptureGranted => write!(f, "capture-granted"),
            Trigger::CaptureFailed => write!(f, "capture-failed"),
        }
    }
}

/// Which of the three buttons are enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonState {
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub download_enabled: bool,
}

impl ButtonState {
    /// Number of enabled buttons
    pub fn enabled_count(&self) -> usize {
        [self.start_enabled, self.stop_enabled, self.download_enabled]
            .iter()
            .filter(|enabled| **enabled)
            .count()
    }
}

impl Default for ButtonState {
    fn default() -> Self {
        UiState::default().buttons()
    }
}

impl UiState {
    /// Button record for this state
    pub fn buttons(self) -> ButtonState {
        match self {
            UiState::Idle => ButtonState {
                start_enabled: true,
                stop_enabled: false,
                download_enabled: false,
            },
            UiState::Recording => ButtonState {
                start_enabled: false,
                stop_enabled: true,
                download_enabled: false,
            },
            UiState::Finished => ButtonState {
                start_enabled: false,
                stop_enabled: false,
                download_enabled: true,
            },
        }
    }

    /// Transition table. `None` means the trigger is not accepted here.
    pub fn next(self, trigger: Trigger) -> Option<UiState> {
        match (self, trigger) {
            (UiState::Idle, Trigger::Start) => Some(UiState::Recording),
            (UiState::Recording, Trigger::Stop) => Some(UiState::Finished),
            (UiState::Recording, Trigger::StreamEnded) => Some(UiState::Finished),
            (UiState::Recording, Trigger::CaptureGranted) => Some(UiState::Recording),
            (UiState::Recording, Trigger::CaptureFailed) => Some(UiState::Idle),
            (UiState::Finished, Trigger::Download) => Some(UiState::Finished),
            (UiState::Finished, Trigger::Start) => Some(UiState::Recording),
            _ => None,
        }
    }

    pub fn accepts(self, trigger: Trigger) -> bool {
        self.next(trigger).is_some()
    }
}
