use anyhow::Result;
use std::fmt;
use tokio::sync::mpsc;

use crate::audio::CaptureMode;

/// One recognition hypothesis from the engine.
///
/// Final hypotheses are confidently segmented and safe to accumulate; interim
/// hypotheses are revised and re-sent each tick.
#[derive(Debug, Clone)]
pub struct Hypothesis {
    pub text: String,
    pub is_final: bool,
}

impl Hypothesis {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }
}

/// Error conditions the engine distinguishes on its error channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Terminal for the session: recording must stop
    PermissionDenied,
    /// Benign: recognition continues
    NoSpeech,
    /// Anything else; recovery is delegated to termination handling
    Other(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::PermissionDenied => write!(f, "microphone permission denied"),
            EngineError::NoSpeech => write!(f, "no speech detected"),
            EngineError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Events emitted by a speech engine.
///
/// A closed event channel is equivalent to `Ended`.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A hypothesis batch: finals to accumulate plus the current interim set
    Results(Vec<Hypothesis>),
    Error(EngineError),
    /// The engine stopped (silence, backgrounding, engine limits)
    Ended,
}

/// The continuous, interim-result-capable speech-to-text capability.
///
/// The engine is opaque: implementations adapt whatever recognition facility
/// the host provides to this event contract. Each `start` returns a fresh
/// event stream; the engine may be started again after it ends.
#[async_trait::async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Begin continuous recognition. `Err` means the capability is
    /// unavailable on this host or failed to start.
    async fn start(&mut self, mode: CaptureMode) -> Result<mpsc::Receiver<EngineEvent>>;

    /// Stop recognition. Idempotent.
    async fn stop(&mut self) -> Result<()>;

    /// Engine name for logging
    fn name(&self) -> &str;
}

/// Placeholder engine for hosts without a recognition capability.
///
/// `start` always fails, which surfaces the user-facing "recognition
/// unavailable" alert path in the recognizer.
pub struct UnavailableEngine;

#[async_trait::async_trait]
impl SpeechEngine for UnavailableEngine {
    async fn start(&mut self, _mode: CaptureMode) -> Result<mpsc::Receiver<EngineEvent>> {
        anyhow::bail!("no speech recognition capability available on this host")
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}
