use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audio::{AudioTuning, SegmentConfig};
use crate::recognizer::RecognizerConfig;
use crate::upload::UploadConfig;

/// Plan/entitlement flag consumed from the external billing collaborator.
///
/// Checked at segment-emission time — the plan may change mid-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Premium,
    Ultimate,
}

impl PlanTier {
    pub fn chunked_uploads_enabled(self) -> bool {
        self != PlanTier::Free
    }
}

impl Default for PlanTier {
    fn default() -> Self {
        PlanTier::Free
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionConfig {
    /// Remote transcription endpoint URL
    pub endpoint: String,
    /// Bearer token for the endpoint
    pub auth_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Capture source spec: "microphone" or "file:<path>"
    pub source: String,
    pub tuning: AudioTuning,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            source: "microphone".to_string(),
            tuning: AudioTuning::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub segment: SegmentConfig,
    pub upload: UploadConfig,
    pub recognizer: RecognizerConfig,
    /// Run the whole-transcript cleanup pass at session end for free-tier
    /// sessions
    pub final_cleanup: bool,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
