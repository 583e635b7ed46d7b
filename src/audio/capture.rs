use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Recording mode, selects the capture constraints applied to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Ambient capture for lecture halls: echo cancellation on, noise
    /// suppression off to preserve distant speech.
    Lecture,
    /// Near-field capture for meetings: echo cancellation and noise
    /// suppression both on.
    Meeting,
}

impl CaptureMode {
    pub fn constraints(self) -> CaptureConstraints {
        match self {
            CaptureMode::Lecture => CaptureConstraints {
                echo_cancellation: true,
                noise_suppression: false,
                ..CaptureConstraints::default()
            },
            CaptureMode::Meeting => CaptureConstraints {
                echo_cancellation: true,
                noise_suppression: true,
                ..CaptureConstraints::default()
            },
        }
    }
}

impl Default for CaptureMode {
    fn default() -> Self {
        CaptureMode::Lecture
    }
}

/// Constraints requested from the capture source.
#[derive(Debug, Clone)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Target sample rate (16kHz keeps uploads small while sufficient for speech)
    pub sample_rate: u32,
    /// Channel count (1 = mono)
    pub channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: false,
            auto_gain_control: true,
            sample_rate: 16000,
            channels: 1,
            buffer_duration_ms: 100,
        }
    }
}

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Audio capture source trait
///
/// Implementations:
/// - File: stream a WAV file as frames (tests/batch processing)
/// - Microphone: platform capture glue, injected by the embedding application
#[async_trait::async_trait]
pub trait AudioCapture: Send + Sync {
    /// Start capturing audio under the given constraints
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self, constraints: &CaptureConstraints) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio. Idempotent.
    async fn stop(&mut self) -> Result<()>;

    /// Check if the source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get source name for logging
    fn name(&self) -> &str;
}

/// Audio capture source type
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// Microphone input
    Microphone,
    /// File input (for testing/batch processing)
    File(String),
}

/// Capture source factory
pub struct CaptureFactory;

impl CaptureFactory {
    pub fn create(source: CaptureSource) -> Result<Box<dyn AudioCapture>> {
        match source {
            CaptureSource::Microphone => {
                anyhow::bail!("Microphone capture requires a platform backend; inject one via the library API")
            }
            CaptureSource::File(path) => {
                let capture = super::file::FileCapture::new(path);
                Ok(Box::new(capture))
            }
        }
    }

    /// Parse a capture source spec from config ("microphone" or "file:<path>")
    pub fn parse_source(spec: &str) -> Result<CaptureSource> {
        if spec == "microphone" {
            return Ok(CaptureSource::Microphone);
        }
        if let Some(path) = spec.strip_prefix("file:") {
            return Ok(CaptureSource::File(path.to_string()));
        }
        anyhow::bail!("Unknown capture source: {}", spec)
    }
}
