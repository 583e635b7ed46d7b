//! Continuous local speech recognition
//!
//! Wraps an opaque, interim-result-capable speech engine behind a resilient
//! state machine (`idle → recording → restarting → recording`): hypotheses
//! accumulate in the Workspace, unexpected engine terminations force-commit
//! the pending interim text and restart recognition after a short delay, and
//! the upload coordinator reconciles server-confirmed text against the
//! Workspace through the snapshot/prefix-clear protocol.

pub mod engine;
pub mod service;
pub mod workspace;

pub use engine::{EngineError, EngineEvent, Hypothesis, SpeechEngine, UnavailableEngine};
pub use service::{LocalRecognizer, RecognizerConfig, RecognizerState, WorkspaceHandle};
pub use workspace::{RecognitionSnapshot, Workspace};
