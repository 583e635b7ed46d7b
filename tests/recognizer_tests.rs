// Integration tests for the local recognizer state machine
//
// These tests drive the recognizer with a scripted speech engine and verify
// hypothesis handling, restart resilience after unexpected terminations, and
// the terminal permission-denied path.

use anyhow::Result;
use lectern::audio::CaptureMode;
use lectern::recognizer::{
    EngineError, EngineEvent, Hypothesis, LocalRecognizer, RecognizerConfig, RecognizerState,
    SpeechEngine, UnavailableEngine, WorkspaceHandle,
};
use lectern::session::SessionAlert;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Speech engine fake controlled from the test.
///
/// Each `start` hands the test the sender side of the event stream through a
/// shared slot; dropping that sender simulates an unexpected engine
/// termination. With `hold_sender` off, every start terminates immediately.
struct ScriptedEngine {
    starts: Arc<AtomicUsize>,
    slot: Arc<StdMutex<Option<mpsc::Sender<EngineEvent>>>>,
    hold_sender: bool,
    /// 1-based start index from which `start` begins to fail
    fail_from_start: usize,
}

impl ScriptedEngine {
    fn new(hold_sender: bool) -> (Box<Self>, Arc<AtomicUsize>, EngineHandle) {
        let starts = Arc::new(AtomicUsize::new(0));
        let slot = Arc::new(StdMutex::new(None));
        let engine = Box::new(Self {
            starts: Arc::clone(&starts),
            slot: Arc::clone(&slot),
            hold_sender,
            fail_from_start: usize::MAX,
        });
        (engine, starts, EngineHandle { slot })
    }
}

/// Test-side handle to the engine's current event stream.
struct EngineHandle {
    slot: Arc<StdMutex<Option<mpsc::Sender<EngineEvent>>>>,
}

impl EngineHandle {
    async fn sender(&self) -> mpsc::Sender<EngineEvent> {
        for _ in 0..300 {
            if let Some(tx) = self.slot.lock().unwrap().as_ref() {
                return tx.clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("engine was never started");
    }

    /// Simulate an unexpected engine termination.
    fn terminate(&self) {
        self.slot.lock().unwrap().take();
    }
}

#[async_trait::async_trait]
impl SpeechEngine for ScriptedEngine {
    async fn start(&mut self, _mode: CaptureMode) -> Result<mpsc::Receiver<EngineEvent>> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= self.fail_from_start {
            anyhow::bail!("engine refused to start (scripted)");
        }

        let (tx, rx) = mpsc::channel(32);
        if self.hold_sender {
            *self.slot.lock().unwrap() = Some(tx);
        }
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.slot.lock().unwrap().take();
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn build(engine: Box<dyn SpeechEngine>) -> (LocalRecognizer, mpsc::UnboundedReceiver<SessionAlert>) {
    let (alerts_tx, alerts_rx) = mpsc::unbounded_channel();
    let recognizer = LocalRecognizer::new(engine, RecognizerConfig::default(), alerts_tx);
    (recognizer, alerts_rx)
}

/// Poll until the workspace shows the expected text (the driver task applies
/// engine events asynchronously).
async fn wait_for_text(workspace: &WorkspaceHandle, expected: &str) {
    for _ in 0..300 {
        if workspace.visible().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "workspace never reached {:?}, last seen {:?}",
        expected,
        workspace.visible().await
    );
}

async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within timeout");
}

fn drain(alerts: &mut mpsc::UnboundedReceiver<SessionAlert>) -> Vec<SessionAlert> {
    let mut seen = Vec::new();
    while let Ok(alert) = alerts.try_recv() {
        seen.push(alert);
    }
    seen
}

#[tokio::test]
async fn test_interim_replaced_and_finals_accumulated() -> Result<()> {
    let (engine, _starts, handle) = ScriptedEngine::new(true);
    let (recognizer, _alerts) = build(engine);
    let workspace = recognizer.workspace();

    recognizer.start(CaptureMode::Lecture).await?;
    let events = handle.sender().await;

    events
        .send(EngineEvent::Results(vec![Hypothesis::interim("the mitoch")]))
        .await?;
    wait_for_text(&workspace, "the mitoch").await;

    // The engine re-sends the revised hypothesis as a final; the stale
    // interim guess is replaced, not appended
    events
        .send(EngineEvent::Results(vec![Hypothesis::final_text(
            "the mitochondria is",
        )]))
        .await?;
    wait_for_text(&workspace, "the mitochondria is").await;

    recognizer.stop().await;
    assert_eq!(recognizer.state(), RecognizerState::Idle);
    assert_eq!(workspace.visible().await, "", "stop clears the workspace");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_survives_repeated_unexpected_terminations() -> Result<()> {
    // Every start terminates immediately: the event channel is born closed
    let (engine, starts, _handle) = ScriptedEngine::new(false);
    let (recognizer, _alerts) = build(engine);

    recognizer.start(CaptureMode::Lecture).await?;

    let starts_seen = Arc::clone(&starts);
    eventually(move || starts_seen.load(Ordering::SeqCst) >= 50).await;

    assert_ne!(
        recognizer.state(),
        RecognizerState::Idle,
        "recognizer must keep restarting while recording is desired"
    );

    recognizer.stop().await;
    assert_eq!(recognizer.state(), RecognizerState::Idle);

    Ok(())
}

#[tokio::test]
async fn test_termination_commits_pending_interim_text() -> Result<()> {
    let (engine, starts, handle) = ScriptedEngine::new(true);
    let (recognizer, _alerts) = build(engine);
    let workspace = recognizer.workspace();

    recognizer.start(CaptureMode::Lecture).await?;
    let events = handle.sender().await;

    events
        .send(EngineEvent::Results(vec![
            Hypothesis::final_text("hello"),
            Hypothesis::interim(" world"),
        ]))
        .await?;
    wait_for_text(&workspace, "hello world").await;

    // Unexpected termination: the pending interim must be force-committed,
    // then the engine restarts
    handle.terminate();
    drop(events);
    let starts_seen = Arc::clone(&starts);
    eventually(move || starts_seen.load(Ordering::SeqCst) >= 2).await;

    // A fresh interim from the restarted engine appends after the committed
    // text instead of replacing it
    let events = handle.sender().await;
    events
        .send(EngineEvent::Results(vec![Hypothesis::interim(" again")]))
        .await?;
    wait_for_text(&workspace, "hello world again").await;

    recognizer.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_permission_denied_is_terminal() -> Result<()> {
    let (engine, starts, handle) = ScriptedEngine::new(true);
    let (recognizer, mut alerts) = build(engine);

    recognizer.start(CaptureMode::Meeting).await?;
    let events = handle.sender().await;

    events
        .send(EngineEvent::Error(EngineError::PermissionDenied))
        .await?;

    {
        let rec = &recognizer;
        eventually(move || rec.state() == RecognizerState::Idle).await;
    }

    assert_eq!(drain(&mut alerts), vec![SessionAlert::MicrophonePermissionDenied]);
    assert_eq!(starts.load(Ordering::SeqCst), 1, "no restart after permission denial");

    recognizer.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_no_speech_error_is_ignored() -> Result<()> {
    let (engine, _starts, handle) = ScriptedEngine::new(true);
    let (recognizer, mut alerts) = build(engine);
    let workspace = recognizer.workspace();

    recognizer.start(CaptureMode::Lecture).await?;
    let events = handle.sender().await;

    events
        .send(EngineEvent::Error(EngineError::NoSpeech))
        .await?;
    events
        .send(EngineEvent::Results(vec![Hypothesis::final_text("still here")]))
        .await?;
    wait_for_text(&workspace, "still here").await;

    assert_eq!(recognizer.state(), RecognizerState::Recording);
    assert!(drain(&mut alerts).is_empty());

    recognizer.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_double_restart_failure_surfaces_alert() -> Result<()> {
    let (mut engine, starts, handle) = ScriptedEngine::new(true);
    engine.fail_from_start = 2; // first start works, every restart fails
    let (recognizer, mut alerts) = build(engine);

    recognizer.start(CaptureMode::Lecture).await?;
    // Wait for the engine to come up, then drop our sender clone so the
    // termination below actually closes the event channel
    drop(handle.sender().await);
    handle.terminate();

    {
        let rec = &recognizer;
        eventually(move || rec.state() == RecognizerState::Idle).await;
    }

    assert_eq!(drain(&mut alerts), vec![SessionAlert::RecognitionRestartFailed]);
    assert_eq!(starts.load(Ordering::SeqCst), 3);

    Ok(())
}

#[tokio::test]
async fn test_unavailable_capability_alerts_and_fails_start() -> Result<()> {
    let (recognizer, mut alerts) = build(Box::new(UnavailableEngine));

    let result = recognizer.start(CaptureMode::Lecture).await;

    assert!(result.is_err());
    assert_eq!(recognizer.state(), RecognizerState::Idle);
    assert_eq!(drain(&mut alerts), vec![SessionAlert::RecognitionUnavailable]);

    Ok(())
}

#[tokio::test]
async fn test_start_while_recording_is_a_noop() -> Result<()> {
    let (engine, starts, _handle) = ScriptedEngine::new(true);
    let (recognizer, _alerts) = build(engine);

    recognizer.start(CaptureMode::Lecture).await?;
    recognizer.start(CaptureMode::Lecture).await?;

    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(recognizer.state(), RecognizerState::Recording);

    recognizer.stop().await;
    Ok(())
}
