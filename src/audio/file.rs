use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::capture::{AudioCapture, AudioFrame, CaptureConstraints};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Capture source backed by a WAV file
///
/// Streams the file as fixed-duration frames. With `realtime` set, frames are
/// paced at playback speed so the downstream pipeline behaves as it would with
/// a live source; otherwise the whole file is delivered as fast as possible.
pub struct FileCapture {
    path: String,
    realtime: bool,
    capturing: bool,
    task: Option<JoinHandle<()>>,
}

impl FileCapture {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            realtime: true,
            capturing: false,
            task: None,
        }
    }

    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

#[async_trait::async_trait]
impl AudioCapture for FileCapture {
    async fn start(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<mpsc::Receiver<AudioFrame>> {
        let audio = AudioFile::open(&self.path)?;

        if audio.sample_rate != constraints.sample_rate || audio.channels != constraints.channels {
            warn!(
                "File format ({}Hz/{}ch) differs from requested constraints ({}Hz/{}ch); streaming as-is",
                audio.sample_rate, audio.channels, constraints.sample_rate, constraints.channels
            );
        }

        let frame_samples = (audio.sample_rate as u64 * constraints.buffer_duration_ms / 1000)
            as usize
            * audio.channels as usize;
        let frame_duration_ms = constraints.buffer_duration_ms;
        let realtime = self.realtime;

        let (tx, rx) = mpsc::channel(100);

        let task = tokio::spawn(async move {
            let mut timestamp_ms = 0u64;
            for chunk in audio.samples.chunks(frame_samples.max(1)) {
                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    timestamp_ms,
                };
                timestamp_ms += frame_duration_ms;

                if tx.send(frame).await.is_err() {
                    break;
                }

                if realtime {
                    tokio::time::sleep(std::time::Duration::from_millis(frame_duration_ms)).await;
                }
            }
            info!("File capture reached end of input");
        });

        self.task = Some(task);
        self.capturing = true;

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "file"
    }
}
