use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audio::VolumeState;
use crate::recognizer::RecognizerState;
use crate::upload::UploadStatus;

/// User-actionable conditions surfaced during a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAlert {
    /// The host provides no speech recognition capability
    RecognitionUnavailable,
    /// Terminal: recording cannot continue without the microphone
    MicrophonePermissionDenied,
    /// The recognition engine could not be restarted after two attempts
    RecognitionRestartFailed,
}

/// Point-in-time view of a recording session, serialized for the HTTP API
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,
    pub is_recording: bool,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    /// Confirmed segments appended to the transcript so far
    pub confirmed_segments: usize,
    /// Successful uploads (including empty acknowledgments)
    pub uploads_completed: usize,
    pub recognizer_state: RecognizerState,
    pub upload_status: UploadStatus,
    /// Seconds remaining in the current buffering phase (observational)
    pub countdown: u32,
    pub volume: VolumeState,
    pub alerts: Vec<SessionAlert>,
}
