use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::engine::{EngineError, EngineEvent, SpeechEngine};
use super::workspace::{RecognitionSnapshot, Workspace};
use crate::audio::CaptureMode;
use crate::session::SessionAlert;

/// Recognizer timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Delay before restarting a terminated engine. Kept small: longer gaps
    /// risk losing the start of the next utterance.
    pub restart_delay: Duration,
    /// Delay before the single retry when the restart call itself fails
    pub restart_retry_delay: Duration,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_millis(100),
            restart_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Recognizer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognizerState {
    Idle,
    Recording,
    Restarting,
}

/// Shared access to the Workspace for the upload coordinator and UI reads.
#[derive(Clone)]
pub struct WorkspaceHandle(Arc<Mutex<Workspace>>);

impl WorkspaceHandle {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Workspace::new())))
    }

    /// Read the current Workspace without mutating it.
    pub async fn snapshot(&self) -> RecognitionSnapshot {
        self.0.lock().await.snapshot()
    }

    /// Append a final hypothesis.
    pub async fn append_final(&self, text: &str) {
        self.0.lock().await.append_final(text);
    }

    /// Replace the interim buffer.
    pub async fn set_interim(&self, text: &str) {
        self.0.lock().await.set_interim(text);
    }

    /// Remove the snapshot-covered prefix if it still matches (no-op on
    /// divergence). Returns whether anything was cleared.
    pub async fn clear_confirmed_prefix(&self, snapshot: &RecognitionSnapshot) -> bool {
        self.0.lock().await.clear_confirmed_prefix(snapshot)
    }

    pub async fn visible(&self) -> String {
        self.0.lock().await.visible()
    }

    /// Take everything and reset (session-final fallback commit).
    pub async fn take_all(&self) -> String {
        self.0.lock().await.take_all()
    }

    async fn lock(&self) -> tokio::sync::MutexGuard<'_, Workspace> {
        self.0.lock().await
    }
}

impl Default for WorkspaceHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps the opaque speech engine into a continuous, resilient recognizer.
///
/// A single driver task owns the engine and is the only mutator of recognizer
/// state, so a restart can never race a stop: stopping flips a watch flag the
/// driver observes at every suspension point, including restart sleeps.
pub struct LocalRecognizer {
    config: RecognizerConfig,
    workspace: WorkspaceHandle,
    engine: Mutex<Option<Box<dyn SpeechEngine>>>,
    state_rx: watch::Receiver<RecognizerState>,
    state_tx: watch::Sender<RecognizerState>,
    desired_tx: watch::Sender<bool>,
    alerts: mpsc::UnboundedSender<SessionAlert>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl LocalRecognizer {
    pub fn new(
        engine: Box<dyn SpeechEngine>,
        config: RecognizerConfig,
        alerts: mpsc::UnboundedSender<SessionAlert>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(RecognizerState::Idle);
        let (desired_tx, _) = watch::channel(false);

        Self {
            config,
            workspace: WorkspaceHandle::new(),
            engine: Mutex::new(Some(engine)),
            state_rx,
            state_tx,
            desired_tx,
            alerts,
            driver: Mutex::new(None),
        }
    }

    pub fn workspace(&self) -> WorkspaceHandle {
        self.workspace.clone()
    }

    pub fn state(&self) -> RecognizerState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<RecognizerState> {
        self.state_rx.clone()
    }

    /// Begin continuous recognition. No-op if already running; surfaces a
    /// user-facing alert and errors when the capability is unavailable.
    pub async fn start(&self, mode: CaptureMode) -> Result<()> {
        if self.state() != RecognizerState::Idle {
            warn!("Recognizer already running");
            return Ok(());
        }

        let mut engine = self
            .engine
            .lock()
            .await
            .take()
            .context("Recognizer was already consumed by this session")?;

        let events = match engine.start(mode).await {
            Ok(events) => events,
            Err(e) => {
                warn!("Speech recognition unavailable: {:#}", e);
                let _ = self.alerts.send(SessionAlert::RecognitionUnavailable);
                *self.engine.lock().await = Some(engine);
                return Err(e.context("Failed to start speech recognition"));
            }
        };

        info!("Speech recognition started ({})", engine.name());

        self.desired_tx.send_replace(true);
        self.state_tx.send_replace(RecognizerState::Recording);

        let task = tokio::spawn(drive(
            engine,
            events,
            mode,
            self.config.clone(),
            self.workspace.clone(),
            self.state_tx.clone(),
            self.desired_tx.subscribe(),
            self.alerts.clone(),
        ));

        *self.driver.lock().await = Some(task);

        Ok(())
    }

    /// Transition to idle: cancels any pending restart and clears the
    /// Workspace. Idempotent.
    pub async fn stop(&self) {
        self.desired_tx.send_replace(false);

        if let Some(task) = self.driver.lock().await.take() {
            if let Err(e) = task.await {
                error!("Recognizer driver panicked: {}", e);
            }
        }

        self.workspace.lock().await.reset();
    }
}

/// The recognizer state machine: one handling arm per event type.
#[allow(clippy::too_many_arguments)]
async fn drive(
    mut engine: Box<dyn SpeechEngine>,
    mut events: mpsc::Receiver<EngineEvent>,
    mode: CaptureMode,
    config: RecognizerConfig,
    workspace: WorkspaceHandle,
    state_tx: watch::Sender<RecognizerState>,
    mut desired: watch::Receiver<bool>,
    alerts: mpsc::UnboundedSender<SessionAlert>,
) {
    'session: loop {
        // Consume events until the engine terminates or recording stops
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(EngineEvent::Results(batch)) => {
                        let mut ws = workspace.lock().await;
                        let mut interim = String::new();
                        for hypothesis in batch {
                            if hypothesis.is_final {
                                ws.append_final(&hypothesis.text);
                            } else {
                                interim.push_str(&hypothesis.text);
                            }
                        }
                        // Interim is fully replaced, never appended: the
                        // engine re-sends revised interim text each tick
                        ws.set_interim(&interim);
                    }
                    Some(EngineEvent::Error(EngineError::PermissionDenied)) => {
                        error!("Microphone permission denied, stopping recognition");
                        let _ = alerts.send(SessionAlert::MicrophonePermissionDenied);
                        break 'session;
                    }
                    Some(EngineEvent::Error(EngineError::NoSpeech)) => {
                        debug!("No speech detected, recognition continues");
                    }
                    Some(EngineEvent::Error(EngineError::Other(msg))) => {
                        warn!("Recognition error (recovering via restart): {}", msg);
                    }
                    Some(EngineEvent::Ended) | None => break,
                },
                changed = desired.changed() => {
                    if changed.is_err() || !*desired.borrow() {
                        break 'session;
                    }
                }
            }
        }

        if !*desired.borrow() {
            break;
        }

        // Unexpected termination while recording is still desired: keep any
        // pending interim text, then restart after a short delay
        workspace.lock().await.commit_interim();
        state_tx.send_replace(RecognizerState::Restarting);
        debug!("Recognition engine terminated, restarting");

        if !sleep_unless_stopped(config.restart_delay, &mut desired).await {
            break;
        }

        match engine.start(mode).await {
            Ok(rx) => {
                events = rx;
                state_tx.send_replace(RecognizerState::Recording);
                info!("Recognition restarted");
            }
            Err(e) => {
                warn!("Failed to restart recognition: {:#}, retrying once", e);

                if !sleep_unless_stopped(config.restart_retry_delay, &mut desired).await {
                    break;
                }

                match engine.start(mode).await {
                    Ok(rx) => {
                        events = rx;
                        state_tx.send_replace(RecognizerState::Recording);
                        info!("Recognition restarted after retry");
                    }
                    Err(e) => {
                        error!("Recognition restart failed twice, giving up: {:#}", e);
                        let _ = alerts.send(SessionAlert::RecognitionRestartFailed);
                        break 'session;
                    }
                }
            }
        }
    }

    if let Err(e) = engine.stop().await {
        warn!("Engine stop error: {:#}", e);
    }
    state_tx.send_replace(RecognizerState::Idle);
}

/// Sleep for the given duration, returning false early if recording stops.
async fn sleep_unless_stopped(duration: Duration, desired: &mut watch::Receiver<bool>) -> bool {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(duration) => return true,
            changed = desired.changed() => {
                if changed.is_err() || !*desired.borrow() {
                    return false;
                }
            }
        }
    }
}
