// Audio processing graph for microphone cleanup and loudness monitoring
//
// Fixed filter chain, each stage feeding the next:
//   source -> high-pass (rumble cut) -> presence boost -> adaptive gain
//          -> RMS analysis tap -> recording output
//
// The analysis tap drives the adaptive gain stage and publishes a VolumeState
// (normalized level + sticky "too quiet" flag) on a watch channel.

use std::f32::consts::PI;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::capture::AudioFrame;
use serde::{Deserialize, Serialize};

/// Tuning parameters for the processing graph
///
/// The RMS thresholds are empirical; they are carried in configuration rather
/// than hard constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioTuning {
    /// High-pass cutoff for rumble/handling noise
    pub highpass_hz: f32,
    /// Center of the speech-presence peaking boost
    pub presence_hz: f32,
    pub presence_q: f32,
    pub presence_gain_db: f32,
    /// Adaptive gain step per monitoring tick
    pub gain_step: f32,
    pub gain_floor: f32,
    pub gain_ceiling: f32,
    /// RMS below this (and non-zero) nudges gain up
    pub quiet_rms: f32,
    /// RMS above this nudges gain down
    pub loud_rms: f32,
    /// RMS below this counts toward the sticky "too quiet" flag
    pub low_volume_floor: f32,
    /// Consecutive low ticks before the flag activates (~2-3 seconds)
    pub low_volume_ticks: u32,
    /// Scale factor from RMS to the UI-facing level
    pub level_scale: f32,
}

impl Default for AudioTuning {
    fn default() -> Self {
        Self {
            highpass_hz: 100.0,
            presence_hz: 1500.0,
            presence_q: 0.5,
            presence_gain_db: 3.0,
            gain_step: 0.05,
            gain_floor: 1.0,
            gain_ceiling: 3.0,
            quiet_rms: 0.05,
            loud_rms: 0.2,
            low_volume_floor: 0.01,
            low_volume_ticks: 100,
            level_scale: 5.0,
        }
    }
}

/// Snapshot of the loudness monitor, recomputed every tick
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VolumeState {
    /// Raw RMS of the last processed frame (0.0 to 1.0)
    pub rms: f32,
    /// RMS scaled for UI legibility, clamped to 1.0
    pub level: f32,
    /// Current adaptive gain multiplier
    pub gain: f32,
    /// Sticky low-volume flag; set after sustained quiet, cleared immediately
    /// on an adequately loud tick
    pub too_low: bool,
}

impl Default for VolumeState {
    fn default() -> Self {
        Self {
            rms: 0.0,
            level: 0.0,
            gain: 1.0,
            too_low: false,
        }
    }
}

/// Second-order IIR filter section (RBJ cookbook coefficients, Direct Form 1)
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    fn highpass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let w0 = 2.0 * PI * freq / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let a0 = 1.0 + alpha;
        Self {
            b0: ((1.0 + cos_w0) / 2.0) / a0,
            b1: (-(1.0 + cos_w0)) / a0,
            b2: ((1.0 + cos_w0) / 2.0) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn peaking(sample_rate: f32, freq: f32, q: f32, gain_db: f32) -> Self {
        let a = 10f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// The processing graph: filter chain + adaptive gain + loudness monitor
pub struct AudioGraph {
    tuning: AudioTuning,
    highpass: Biquad,
    presence: Biquad,
    gain: f32,
    low_ticks: u32,
    too_low: bool,
    volume_tx: watch::Sender<VolumeState>,
}

impl AudioGraph {
    pub fn new(tuning: AudioTuning, sample_rate: u32) -> (Self, watch::Receiver<VolumeState>) {
        let (volume_tx, volume_rx) = watch::channel(VolumeState::default());

        let graph = Self {
            highpass: Biquad::highpass(sample_rate as f32, tuning.highpass_hz, 0.707),
            presence: Biquad::peaking(
                sample_rate as f32,
                tuning.presence_hz,
                tuning.presence_q,
                tuning.presence_gain_db,
            ),
            gain: tuning.gain_floor,
            low_ticks: 0,
            too_low: false,
            tuning,
            volume_tx,
        };

        (graph, volume_rx)
    }

    /// Run one frame through the chain and update the loudness monitor.
    pub fn process_frame(&mut self, frame: AudioFrame) -> AudioFrame {
        let mut out = Vec::with_capacity(frame.samples.len());
        let mut sum_squares = 0.0f64;

        for &sample in &frame.samples {
            let x = sample as f32 / 32768.0;
            let filtered = self.presence.process(self.highpass.process(x));
            let amplified = (filtered * self.gain).clamp(-1.0, 1.0);
            sum_squares += (amplified as f64) * (amplified as f64);
            out.push((amplified * 32767.0) as i16);
        }

        let rms = if out.is_empty() {
            0.0
        } else {
            (sum_squares / out.len() as f64).sqrt() as f32
        };

        self.monitor_tick(rms);

        AudioFrame {
            samples: out,
            sample_rate: frame.sample_rate,
            channels: frame.channels,
            timestamp_ms: frame.timestamp_ms,
        }
    }

    /// Adaptive gain + sticky low-volume flag, evaluated once per frame.
    ///
    /// The gap between quiet_rms and loud_rms is a hysteresis band: gain holds
    /// steady there, which keeps transient loudness spikes from causing
    /// oscillation.
    fn monitor_tick(&mut self, rms: f32) {
        if rms > 0.0 && rms < self.tuning.quiet_rms {
            self.gain = (self.gain + self.tuning.gain_step).min(self.tuning.gain_ceiling);
        } else if rms > self.tuning.loud_rms {
            self.gain = (self.gain - self.tuning.gain_step).max(self.tuning.gain_floor);
        }

        if rms < self.tuning.low_volume_floor {
            self.low_ticks = self.low_ticks.saturating_add(1);
            if self.low_ticks > self.tuning.low_volume_ticks {
                self.too_low = true;
            }
        } else {
            self.low_ticks = 0;
            self.too_low = false;
        }

        let state = VolumeState {
            rms,
            level: (rms * self.tuning.level_scale).clamp(0.0, 1.0),
            gain: self.gain,
            too_low: self.too_low,
        };
        // Receivers may be gone during teardown
        let _ = self.volume_tx.send(state);
    }

    /// Pump frames from the capture source through the chain until the source
    /// channel closes, then drop the output channel to signal downstream.
    pub async fn run(mut self, mut input: mpsc::Receiver<AudioFrame>, output: mpsc::Sender<AudioFrame>) {
        info!("Audio graph started");

        while let Some(frame) = input.recv().await {
            let processed = self.process_frame(frame);
            if output.send(processed).await.is_err() {
                debug!("Audio graph output closed, stopping");
                break;
            }
        }

        info!("Audio graph stopped");
    }
}
