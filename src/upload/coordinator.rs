//! The merge protocol between locally-guessed and server-confirmed text.
//!
//! Per dispatched segment: guard (size, debounce), snapshot the Workspace,
//! upload with trailing context, then on acknowledgment clear exactly the
//! snapshot prefix and append the server text to the vault. A failed upload
//! clears nothing and retains the segment for the next attempt — a single
//! network failure never loses audio. The coordinator is one task, so uploads
//! are single-flight by construction: interleaved partial clears cannot
//! corrupt the prefix-matching rule.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::client::TranscriptionApi;
use crate::audio::AudioSegment;
use crate::recognizer::WorkspaceHandle;
use crate::transcript::SessionTranscript;

/// Upload protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Accumulated speech duration that triggers a send
    pub send_threshold: Duration,
    /// Minimum interval since the previous successful send
    pub debounce: Duration,
    /// Segments below this size are retained rather than sent (near-empty
    /// containers waste a round trip and often fail server-side decoding)
    pub min_segment_bytes: usize,
    /// Countdown start value for each buffering phase (observational)
    pub countdown_from: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            send_threshold: Duration::from_secs(20),
            debounce: Duration::from_secs(1),
            min_segment_bytes: 1000,
            countdown_from: 20,
        }
    }
}

/// UI-facing upload status, not part of the correctness contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Idle,
    Buffering,
    Processing,
}

pub struct UploadCoordinator {
    config: UploadConfig,
    client: Arc<dyn TranscriptionApi>,
    workspace: WorkspaceHandle,
    vault: Arc<SessionTranscript>,
    status_tx: watch::Sender<UploadStatus>,
    countdown_tx: watch::Sender<u32>,
    uploads_completed: Arc<AtomicUsize>,
    last_confirmed: String,
    last_success_at: Option<Instant>,
    pending: Option<AudioSegment>,
}

impl UploadCoordinator {
    pub fn new(
        config: UploadConfig,
        client: Arc<dyn TranscriptionApi>,
        workspace: WorkspaceHandle,
        vault: Arc<SessionTranscript>,
        uploads_completed: Arc<AtomicUsize>,
    ) -> (Self, watch::Receiver<UploadStatus>, watch::Receiver<u32>) {
        let (status_tx, status_rx) = watch::channel(UploadStatus::Idle);
        let (countdown_tx, countdown_rx) = watch::channel(config.countdown_from);

        let coordinator = Self {
            config,
            client,
            workspace,
            vault,
            status_tx,
            countdown_tx,
            uploads_completed,
            last_confirmed: String::new(),
            last_success_at: None,
            pending: None,
        };

        (coordinator, status_rx, countdown_rx)
    }

    /// Process segments until the input closes, then flush the retained tail.
    pub async fn run(mut self, mut segments: mpsc::Receiver<AudioSegment>) {
        info!(
            "Upload coordinator started (threshold {}s, debounce {}ms)",
            self.config.send_threshold.as_secs(),
            self.config.debounce.as_millis()
        );

        self.enter_buffering();

        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                segment = segments.recv() => match segment {
                    Some(segment) => {
                        self.buffer(segment);

                        let ready = self
                            .pending
                            .as_ref()
                            .map(|p| p.duration() >= self.config.send_threshold)
                            .unwrap_or(false);
                        if ready {
                            self.dispatch(false).await;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if *self.status_tx.borrow() == UploadStatus::Buffering {
                        self.countdown_tx.send_modify(|n| *n = n.saturating_sub(1));
                    }
                }
            }
        }

        // Session is stopping: losing the tail is worse than a slower stop,
        // so attempt one flush of whatever is buffered. No later retry point
        // exists; failure here is logged by dispatch.
        if self.pending.is_some() {
            debug!("Flushing buffered tail before teardown");
            self.dispatch(true).await;
        }

        self.status_tx.send_replace(UploadStatus::Idle);
        info!("Upload coordinator stopped");
    }

    fn buffer(&mut self, segment: AudioSegment) {
        match &mut self.pending {
            Some(pending) => pending.merge(segment),
            None => self.pending = Some(segment),
        }
    }

    /// Attempt to send the pending buffer; returns the success signal.
    ///
    /// On failure the segment is retained for merging into the next attempt.
    /// `final_flush` bypasses the debounce (there is no next attempt), and
    /// below-minimum tails are dropped instead of retained.
    async fn dispatch(&mut self, final_flush: bool) -> bool {
        let Some(segment) = self.pending.take() else {
            return true;
        };

        if segment.is_empty() {
            debug!("Discarding empty segment");
            return true;
        }

        if segment.byte_len() < self.config.min_segment_bytes {
            if final_flush {
                debug!(
                    "Dropping sub-minimum tail segment ({} bytes)",
                    segment.byte_len()
                );
            } else {
                debug!(
                    "Segment below minimum upload size ({} bytes), retaining",
                    segment.byte_len()
                );
                self.pending = Some(segment);
            }
            return false;
        }

        if !final_flush {
            if let Some(last) = self.last_success_at {
                if last.elapsed() < self.config.debounce {
                    debug!("Skipping duplicate send inside debounce window, retaining segment");
                    self.pending = Some(segment);
                    return false;
                }
            }
        }

        // Freeze what the local recognizer had as of chunk cutoff, before the
        // network call: speech continuing during the round trip must survive
        // the prefix clear.
        let snapshot = self.workspace.snapshot().await;

        let audio = match segment.encode_wav() {
            Ok(audio) => audio,
            Err(e) => {
                warn!("Failed to encode segment, retaining: {:#}", e);
                self.pending = Some(segment);
                return false;
            }
        };

        self.status_tx.send_replace(UploadStatus::Processing);

        let result = self.client.transcribe(audio, &self.last_confirmed).await;

        let success = match result {
            Ok(text) => {
                self.last_success_at = Some(Instant::now());
                self.uploads_completed.fetch_add(1, Ordering::SeqCst);

                // Even an empty acknowledgment means the segment was
                // processed; the stale guessed prefix is safe to drop
                self.workspace.clear_confirmed_prefix(&snapshot).await;

                let trimmed = text.trim();
                if trimmed.is_empty() {
                    debug!("No meaningful speech in segment");
                } else {
                    self.vault.append(trimmed).await;
                    self.last_confirmed = trimmed.to_string();
                }
                true
            }
            Err(e) => {
                // Clear nothing: the prefix-clear only ever rides a server
                // acknowledgment, never speculation
                warn!("Segment transcription failed, retaining audio: {:#}", e);
                self.pending = Some(segment);
                false
            }
        };

        self.enter_buffering();
        success
    }

    fn enter_buffering(&mut self) {
        self.status_tx.send_replace(UploadStatus::Buffering);
        self.countdown_tx.send_replace(self.config.countdown_from);
    }
}
