use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::config::SessionConfig;
use super::stats::{SessionAlert, SessionStats};
use crate::audio::{AudioCapture, AudioGraph, SegmentRecorder, VolumeState};
use crate::config::PlanTier;
use crate::recognizer::LocalRecognizer;
use crate::transcript::{SessionTranscript, PARAGRAPH_SEPARATOR};
use crate::upload::{TranscriptionApi, UploadCoordinator, UploadStatus};

/// Observational channels populated when the pipeline starts
struct Monitors {
    volume: watch::Receiver<VolumeState>,
    upload_status: watch::Receiver<UploadStatus>,
    countdown: watch::Receiver<u32>,
}

/// A recording session: capture graph, local recognizer, segment recorder and
/// upload coordinator wired together around one vault and one workspace.
///
/// Sessions are explicitly constructed and explicitly owned — built at
/// session start, disposed at session end — and every piece of state lives on
/// the instance, so multiple sessions can run concurrently.
pub struct RecordingSession {
    config: SessionConfig,
    client: Arc<dyn TranscriptionApi>,
    vault: Arc<SessionTranscript>,
    recognizer: LocalRecognizer,
    capture: Mutex<Option<Box<dyn AudioCapture>>>,
    plan_tx: watch::Sender<PlanTier>,
    started_at: chrono::DateTime<Utc>,
    is_recording: Arc<AtomicBool>,
    uploads_completed: Arc<AtomicUsize>,
    alerts_rx: Mutex<mpsc::UnboundedReceiver<SessionAlert>>,
    alerts_seen: Mutex<Vec<SessionAlert>>,
    monitors: Mutex<Option<Monitors>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RecordingSession {
    pub fn new(
        config: SessionConfig,
        capture: Box<dyn AudioCapture>,
        engine: Box<dyn crate::recognizer::SpeechEngine>,
        client: Arc<dyn TranscriptionApi>,
    ) -> Self {
        let (alerts_tx, alerts_rx) = mpsc::unbounded_channel();
        let recognizer = LocalRecognizer::new(engine, config.recognizer.clone(), alerts_tx);
        let (plan_tx, _) = watch::channel(config.plan);

        Self {
            recognizer,
            client,
            vault: Arc::new(SessionTranscript::new()),
            capture: Mutex::new(Some(capture)),
            plan_tx,
            started_at: Utc::now(),
            is_recording: Arc::new(AtomicBool::new(false)),
            uploads_completed: Arc::new(AtomicUsize::new(0)),
            alerts_rx: Mutex::new(alerts_rx),
            alerts_seen: Mutex::new(Vec::new()),
            monitors: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            config,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn vault(&self) -> Arc<SessionTranscript> {
        Arc::clone(&self.vault)
    }

    /// Update the entitlement tier mid-session (checked at segment emission).
    pub fn set_plan(&self, plan: PlanTier) {
        info!("Session {} plan changed to {:?}", self.config.session_id, plan);
        self.plan_tx.send_replace(plan);
    }

    /// Start recording
    pub async fn start(&self) -> Result<()> {
        if self.is_recording.load(Ordering::SeqCst) {
            warn!("Recording already started");
            return Ok(());
        }

        info!("Starting recording session: {}", self.config.session_id);

        // Recognition first: without the capability, recording does not
        // proceed at all
        self.recognizer
            .start(self.config.mode)
            .await
            .context("Speech recognition could not be started")?;

        let constraints = self.config.mode.constraints();

        let frames_rx = {
            let mut capture = self.capture.lock().await;
            let capture = capture
                .as_mut()
                .context("Session was already torn down")?;
            match capture.start(&constraints).await {
                Ok(rx) => rx,
                Err(e) => {
                    self.recognizer.stop().await;
                    return Err(e.context("Failed to start audio capture"));
                }
            }
        };

        // source -> graph -> segment recorder -> upload coordinator
        let (graph, volume_rx) =
            AudioGraph::new(self.config.tuning.clone(), constraints.sample_rate);
        let (processed_tx, processed_rx) = mpsc::channel(100);
        let graph_task = tokio::spawn(graph.run(frames_rx, processed_tx));

        let recorder = SegmentRecorder::new(
            self.config.segment.clone(),
            volume_rx.clone(),
            self.plan_tx.subscribe(),
        );
        let (segment_tx, segment_rx) = mpsc::channel(100);
        let recorder_task = tokio::spawn(recorder.run(processed_rx, segment_tx));

        let (coordinator, status_rx, countdown_rx) = UploadCoordinator::new(
            self.config.upload.clone(),
            Arc::clone(&self.client),
            self.recognizer.workspace(),
            Arc::clone(&self.vault),
            Arc::clone(&self.uploads_completed),
        );
        let upload_task = tokio::spawn(coordinator.run(segment_rx));

        *self.monitors.lock().await = Some(Monitors {
            volume: volume_rx,
            upload_status: status_rx,
            countdown: countdown_rx,
        });
        *self.tasks.lock().await = vec![graph_task, recorder_task, upload_task];

        self.is_recording.store(true, Ordering::SeqCst);
        info!("Recording session started: {}", self.config.session_id);

        Ok(())
    }

    /// Stop recording: tears the pipeline down in order, flushing the
    /// buffered audio tail before returning. Idempotent.
    pub async fn stop(&self) -> Result<SessionStats> {
        if !self.is_recording.swap(false, Ordering::SeqCst) {
            warn!("Recording not active");
            return Ok(self.stats().await);
        }

        info!("Stopping recording session: {}", self.config.session_id);

        // Keep the interim tail before the recognizer clears its workspace;
        // taking it also invalidates any snapshot still in flight
        let tail = self.recognizer.workspace().take_all().await;

        self.recognizer.stop().await;

        // Closing the capture cascades channel closures down the pipeline:
        // the recorder emits its partial segment, the coordinator flushes it
        {
            let mut capture = self.capture.lock().await;
            if let Some(capture) = capture.as_mut() {
                if let Err(e) = capture.stop().await {
                    warn!("Failed to stop capture: {:#}", e);
                }
            }
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                error!("Pipeline task panicked: {}", e);
            }
        }

        self.finalize_free_tier(tail).await;

        info!("Recording session stopped: {}", self.config.session_id);
        Ok(self.stats().await)
    }

    /// Free-tier special case: chunked uploads were suppressed, so the local
    /// interim text is the only transcript there is. Commit it as a fallback,
    /// then run the single sanctioned whole-vault cleanup pass.
    async fn finalize_free_tier(&self, tail: String) {
        if self.plan_tx.borrow().chunked_uploads_enabled() {
            return;
        }

        let tail = tail.trim();
        if !tail.is_empty() {
            self.vault.append(tail).await;
        }

        if !self.config.final_cleanup || self.vault.is_empty().await {
            return;
        }

        match self.client.finalize(&self.vault.text().await).await {
            Ok(polished) => {
                info!("Final cleanup pass applied ({} chars)", polished.len());
                self.vault.replace_all(polished).await;
            }
            Err(e) => {
                warn!("Final cleanup failed, keeping raw transcript: {:#}", e);
            }
        }
    }

    /// Current session statistics
    pub async fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);

        let (volume, upload_status, countdown) = match self.monitors.lock().await.as_ref() {
            Some(monitors) => (
                *monitors.volume.borrow(),
                *monitors.upload_status.borrow(),
                *monitors.countdown.borrow(),
            ),
            None => (VolumeState::default(), UploadStatus::Idle, 0),
        };

        SessionStats {
            session_id: self.config.session_id.clone(),
            is_recording: self.is_recording.load(Ordering::SeqCst),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            confirmed_segments: self.vault.segment_count().await,
            uploads_completed: self.uploads_completed.load(Ordering::SeqCst),
            recognizer_state: self.recognizer.state(),
            upload_status,
            countdown,
            volume,
            alerts: self.alerts().await,
        }
    }

    /// Alerts raised so far (permission problems, missing capability)
    pub async fn alerts(&self) -> Vec<SessionAlert> {
        let mut seen = self.alerts_seen.lock().await;
        let mut rx = self.alerts_rx.lock().await;
        while let Ok(alert) = rx.try_recv() {
            seen.push(alert);
        }
        seen.clone()
    }

    /// Confirmed transcript text
    pub async fn vault_text(&self) -> String {
        self.vault.text().await
    }

    /// Volatile interim transcript text
    pub async fn workspace_text(&self) -> String {
        self.recognizer.workspace().visible().await
    }

    /// The transcript a viewer sees: vault followed by workspace.
    pub async fn visible_text(&self) -> String {
        let vault = self.vault_text().await;
        let workspace = self.workspace_text().await;

        if vault.is_empty() {
            workspace
        } else if workspace.is_empty() {
            vault
        } else {
            format!("{vault}{PARAGRAPH_SEPARATOR}{workspace}")
        }
    }
}
