// End-to-end tests for recording sessions
//
// These tests run the full pipeline — file-backed capture, processing graph,
// segment recorder, upload coordinator — against a fake transcription
// endpoint and a scripted speech engine.

use anyhow::Result;
use lectern::audio::{CaptureMode, FileCapture, SegmentConfig};
use lectern::config::PlanTier;
use lectern::recognizer::{EngineEvent, Hypothesis, SpeechEngine, UnavailableEngine};
use lectern::session::{RecordingSession, SessionAlert, SessionConfig};
use lectern::upload::{TranscriptionApi, UploadConfig};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Transcription endpoint fake with pre-loaded chunk replies and a fixed
/// cleanup reply.
struct FakeApi {
    transcribe_replies: StdMutex<VecDeque<String>>,
    transcribe_contexts: StdMutex<Vec<String>>,
    finalize_reply: String,
    finalized_with: StdMutex<Option<String>>,
}

impl FakeApi {
    fn new(replies: &[&str], finalize_reply: &str) -> Arc<Self> {
        Arc::new(Self {
            transcribe_replies: StdMutex::new(
                replies.iter().map(|r| r.to_string()).collect(),
            ),
            transcribe_contexts: StdMutex::new(Vec::new()),
            finalize_reply: finalize_reply.to_string(),
            finalized_with: StdMutex::new(None),
        })
    }

    fn transcribe_calls(&self) -> Vec<String> {
        self.transcribe_contexts.lock().unwrap().clone()
    }

    fn finalized_with(&self) -> Option<String> {
        self.finalized_with.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TranscriptionApi for FakeApi {
    async fn transcribe(&self, _audio: Vec<u8>, context: &str) -> Result<String> {
        self.transcribe_contexts
            .lock()
            .unwrap()
            .push(context.to_string());
        self.transcribe_replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no reply scripted"))
    }

    async fn finalize(&self, full_text: &str) -> Result<String> {
        *self.finalized_with.lock().unwrap() = Some(full_text.to_string());
        Ok(self.finalize_reply.clone())
    }
}

/// Speech engine fake: `start` exposes the event sender through a shared slot.
struct SlotEngine {
    slot: Arc<StdMutex<Option<mpsc::Sender<EngineEvent>>>>,
}

impl SlotEngine {
    fn new() -> (Box<Self>, Arc<StdMutex<Option<mpsc::Sender<EngineEvent>>>>) {
        let slot = Arc::new(StdMutex::new(None));
        (Box::new(Self { slot: Arc::clone(&slot) }), slot)
    }
}

#[async_trait::async_trait]
impl SpeechEngine for SlotEngine {
    async fn start(&mut self, _mode: CaptureMode) -> Result<mpsc::Receiver<EngineEvent>> {
        let (tx, rx) = mpsc::channel(32);
        *self.slot.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.slot.lock().unwrap().take();
        Ok(())
    }

    fn name(&self) -> &str {
        "slot"
    }
}

/// Write a loud 200Hz square wave fixture (16kHz mono), `ms` long.
fn write_fixture(dir: &Path, ms: u32) -> PathBuf {
    let path = dir.join("speech.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..(16 * ms) {
        let sample = if (i / 40) % 2 == 0 { 12000i16 } else { -12000 };
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();

    path
}

fn fast_session_config(session_id: &str, plan: PlanTier, final_cleanup: bool) -> SessionConfig {
    SessionConfig {
        session_id: session_id.to_string(),
        mode: CaptureMode::Lecture,
        plan,
        segment: SegmentConfig {
            segment_interval: Duration::from_secs(1),
            silence_floor: 0.005,
        },
        upload: UploadConfig {
            send_threshold: Duration::from_secs(1),
            debounce: Duration::ZERO,
            min_segment_bytes: 1000,
            countdown_from: 20,
        },
        final_cleanup,
        ..SessionConfig::default()
    }
}

async fn wait_for<F>(session: &RecordingSession, mut done: F)
where
    F: FnMut(&str) -> bool,
{
    for _ in 0..500 {
        if done(&session.vault_text().await) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "vault never reached expected state, last seen {:?}",
        session.vault_text().await
    );
}

#[tokio::test]
async fn test_premium_session_merges_server_text_into_vault() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let fixture = write_fixture(temp_dir.path(), 3000);

    let api = FakeApi::new(&["Alpha.", "Beta.", "Gamma."], "unused");
    let capture = Box::new(FileCapture::new(fixture.to_string_lossy()).with_realtime(false));
    let (engine, _slot) = SlotEngine::new();

    let session = RecordingSession::new(
        fast_session_config("e2e-premium", PlanTier::Premium, false),
        capture,
        engine,
        api.clone(),
    );

    session.start().await?;

    // 3s of audio at 1s segments: three uploads, merged in call order
    wait_for(&session, |vault| vault == "Alpha.\n\nBeta.\n\nGamma.").await;

    // Trailing context chains through the calls
    assert_eq!(api.transcribe_calls(), vec!["", "Alpha.", "Beta."]);

    // No interim text left, so the visible transcript is the vault alone
    assert_eq!(session.workspace_text().await, "");
    assert_eq!(session.visible_text().await, session.vault_text().await);

    let stats = session.stop().await?;
    assert!(!stats.is_recording);
    assert_eq!(stats.uploads_completed, 3);
    assert_eq!(stats.confirmed_segments, 3);
    assert!(stats.alerts.is_empty());
    assert!(api.finalized_with().is_none(), "premium sessions skip the cleanup pass");

    Ok(())
}

#[tokio::test]
async fn test_free_session_falls_back_to_local_text_and_cleanup() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let fixture = write_fixture(temp_dir.path(), 2000);

    let api = FakeApi::new(&[], "Polished transcript.");
    let capture = Box::new(FileCapture::new(fixture.to_string_lossy()).with_realtime(false));
    let (engine, slot) = SlotEngine::new();

    let session = RecordingSession::new(
        fast_session_config("e2e-free", PlanTier::Free, true),
        capture,
        engine,
        api.clone(),
    );

    session.start().await?;

    // The local recognizer is the only transcript source on the free tier
    let events = slot.lock().unwrap().clone().expect("engine started");
    events
        .send(EngineEvent::Results(vec![Hypothesis::final_text(
            "local only transcript",
        )]))
        .await?;

    for _ in 0..300 {
        if session.workspace_text().await == "local only transcript" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(session.workspace_text().await, "local only transcript");

    // Vault + workspace is what a viewer sees
    assert_eq!(session.vault_text().await, "");
    assert_eq!(session.visible_text().await, "local only transcript");

    let stats = session.stop().await?;

    // No chunked uploads happened; the interim tail was committed as a
    // fallback and the single whole-vault cleanup pass replaced it
    assert!(api.transcribe_calls().is_empty());
    assert_eq!(api.finalized_with().as_deref(), Some("local only transcript"));
    assert_eq!(session.vault_text().await, "Polished transcript.");
    assert_eq!(session.workspace_text().await, "");
    assert!(!stats.is_recording);

    Ok(())
}

#[tokio::test]
async fn test_buffered_tail_is_flushed_on_stop() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // Half a second: short of both the segment interval and the send threshold
    let fixture = write_fixture(temp_dir.path(), 500);

    let api = FakeApi::new(&["Tail text."], "unused");
    let capture = Box::new(FileCapture::new(fixture.to_string_lossy()).with_realtime(false));
    let (engine, _slot) = SlotEngine::new();

    let session = RecordingSession::new(
        fast_session_config("e2e-tail", PlanTier::Premium, false),
        capture,
        engine,
        api.clone(),
    );

    session.start().await?;
    wait_for(&session, |vault| vault == "Tail text.").await;

    let stats = session.stop().await?;
    assert_eq!(stats.uploads_completed, 1);
    assert_eq!(session.vault_text().await, "Tail text.");

    Ok(())
}

#[tokio::test]
async fn test_missing_recognition_capability_blocks_start() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let fixture = write_fixture(temp_dir.path(), 500);

    let api = FakeApi::new(&[], "unused");
    let capture = Box::new(FileCapture::new(fixture.to_string_lossy()).with_realtime(false));

    let session = RecordingSession::new(
        fast_session_config("e2e-unavailable", PlanTier::Premium, false),
        capture,
        Box::new(UnavailableEngine),
        api,
    );

    assert!(session.start().await.is_err());

    let stats = session.stats().await;
    assert!(!stats.is_recording);
    assert_eq!(stats.alerts, vec![SessionAlert::RecognitionUnavailable]);

    Ok(())
}

#[tokio::test]
async fn test_stop_is_idempotent() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let fixture = write_fixture(temp_dir.path(), 500);

    let api = FakeApi::new(&["Tail text."], "unused");
    let capture = Box::new(FileCapture::new(fixture.to_string_lossy()).with_realtime(false));
    let (engine, _slot) = SlotEngine::new();

    let session = RecordingSession::new(
        fast_session_config("e2e-idempotent", PlanTier::Premium, false),
        capture,
        engine,
        api,
    );

    session.start().await?;
    session.stop().await?;
    let stats = session.stop().await?;

    assert!(!stats.is_recording);

    Ok(())
}
