use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::capture::AudioFrame;
use super::graph::VolumeState;
use crate::config::PlanTier;

/// Segmenting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Accumulated audio per emitted segment
    pub segment_interval: Duration,
    /// Segments emitted while instantaneous RMS is at or below this floor are
    /// dropped locally (empirical constant, kept configurable)
    pub silence_floor: f32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            segment_interval: Duration::from_secs(5),
            silence_floor: 0.005,
        }
    }
}

/// One complete unit of recorded audio, consumed atomically
///
/// Segments hold PCM so retained audio can be merged across failed upload
/// attempts; `encode_wav` produces the self-contained container at dispatch.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// RMS reported by the volume monitor at emission time
    pub rms: f32,
}

impl AudioSegment {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            channels,
            rms: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Payload size in bytes (16-bit PCM)
    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let per_channel = self.samples.len() as u64 / self.channels as u64;
        Duration::from_millis(per_channel * 1000 / self.sample_rate as u64)
    }

    /// Append another segment's audio (retained-buffer merging)
    pub fn merge(&mut self, other: AudioSegment) {
        self.samples.extend_from_slice(&other.samples);
        self.rms = other.rms;
    }

    /// Encode as a complete, independently decodable WAV container
    pub fn encode_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .context("Failed to create WAV writer")?;
            for &sample in &self.samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            writer.finalize().context("Failed to finalize WAV")?;
        }

        Ok(cursor.into_inner())
    }
}

/// Converts the continuous processed stream into discrete, gated segments
///
/// Stop-and-restart semantics: each emitted segment is a whole unit, and
/// accumulation restarts immediately afterwards. Both gates are evaluated at
/// emission time — the plan may change mid-session.
pub struct SegmentRecorder {
    config: SegmentConfig,
    volume: watch::Receiver<VolumeState>,
    plan: watch::Receiver<PlanTier>,
}

impl SegmentRecorder {
    pub fn new(
        config: SegmentConfig,
        volume: watch::Receiver<VolumeState>,
        plan: watch::Receiver<PlanTier>,
    ) -> Self {
        Self {
            config,
            volume,
            plan,
        }
    }

    pub async fn run(
        self,
        mut frames: mpsc::Receiver<AudioFrame>,
        out: mpsc::Sender<AudioSegment>,
    ) {
        info!(
            "Segment recorder started ({}s segments, silence floor {})",
            self.config.segment_interval.as_secs(),
            self.config.silence_floor
        );

        let mut current: Option<AudioSegment> = None;

        while let Some(frame) = frames.recv().await {
            let segment = current
                .get_or_insert_with(|| AudioSegment::new(frame.sample_rate, frame.channels));
            segment.samples.extend_from_slice(&frame.samples);

            if segment.duration() >= self.config.segment_interval {
                let segment = current.take().unwrap_or_else(|| AudioSegment::new(16000, 1));
                if self.emit(segment, &out).await.is_err() {
                    return;
                }
            }
        }

        // Input closed: flush the partial tail through the same gates
        if let Some(segment) = current.take() {
            let _ = self.emit(segment, &out).await;
        }

        info!("Segment recorder stopped");
    }

    /// Apply the silence and entitlement gates, then forward.
    ///
    /// Returns Err only when the downstream channel is closed.
    async fn emit(&self, mut segment: AudioSegment, out: &mpsc::Sender<AudioSegment>) -> Result<(), ()> {
        segment.rms = self.volume.borrow().rms;

        if segment.rms <= self.config.silence_floor {
            debug!("Skipping silent segment ({:.1}s)", segment.duration().as_secs_f64());
            return Ok(());
        }

        if *self.plan.borrow() == PlanTier::Free {
            debug!("Chunked upload suppressed for free plan");
            return Ok(());
        }

        debug!(
            "Emitting segment: {:.1}s, {} bytes, rms {:.4}",
            segment.duration().as_secs_f64(),
            segment.byte_len(),
            segment.rms
        );

        out.send(segment).await.map_err(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_duration_and_bytes() {
        let mut segment = AudioSegment::new(16000, 1);
        segment.samples = vec![0i16; 16000 * 5];

        assert_eq!(segment.duration(), Duration::from_secs(5));
        assert_eq!(segment.byte_len(), 16000 * 5 * 2);
    }

    #[test]
    fn test_merge_concatenates_audio() {
        let mut a = AudioSegment::new(16000, 1);
        a.samples = vec![1i16; 1600];
        a.rms = 0.1;

        let mut b = AudioSegment::new(16000, 1);
        b.samples = vec![2i16; 3200];
        b.rms = 0.3;

        a.merge(b);

        assert_eq!(a.samples.len(), 4800);
        assert_eq!(a.samples[0], 1);
        assert_eq!(a.samples[1600], 2);
        assert!((a.rms - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_encode_wav_is_decodable() {
        let mut segment = AudioSegment::new(16000, 1);
        segment.samples = (0..1600).map(|i| (i % 100) as i16).collect();

        let wav = segment.encode_wav().unwrap();

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.channels, 1);
        assert_eq!(reader.len() as usize, segment.samples.len());
    }
}
