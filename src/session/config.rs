use serde::{Deserialize, Serialize};

use crate::audio::{AudioTuning, CaptureMode, SegmentConfig};
use crate::config::PlanTier;
use crate::recognizer::RecognizerConfig;
use crate::upload::UploadConfig;

/// Configuration for one recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Unique session identifier
    pub session_id: String,

    /// Capture mode (lecture = ambient, meeting = near-field)
    pub mode: CaptureMode,

    /// Entitlement tier at session start (may be updated mid-session)
    pub plan: PlanTier,

    pub tuning: AudioTuning,
    pub segment: SegmentConfig,
    pub upload: UploadConfig,
    pub recognizer: RecognizerConfig,

    /// Whether to run the single whole-transcript cleanup pass at stop for
    /// sessions that used no chunked uploads
    pub final_cleanup: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            mode: CaptureMode::Lecture,
            plan: PlanTier::Premium,
            tuning: AudioTuning::default(),
            segment: SegmentConfig::default(),
            upload: UploadConfig::default(),
            recognizer: RecognizerConfig::default(),
            final_cleanup: true,
        }
    }
}
