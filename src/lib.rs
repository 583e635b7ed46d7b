pub mod audio;
pub mod config;
pub mod http;
pub mod recognizer;
pub mod session;
pub mod transcript;
pub mod upload;

pub use audio::{
    AudioCapture, AudioFrame, AudioGraph, AudioSegment, AudioTuning, CaptureConstraints,
    CaptureFactory, CaptureMode, CaptureSource, FileCapture, SegmentConfig, SegmentRecorder,
    VolumeState,
};
pub use config::{Config, PlanTier};
pub use http::{create_router, AppState};
pub use recognizer::{
    EngineError, EngineEvent, Hypothesis, LocalRecognizer, RecognitionSnapshot, RecognizerConfig,
    RecognizerState, SpeechEngine, UnavailableEngine, Workspace, WorkspaceHandle,
};
pub use session::{RecordingSession, SessionAlert, SessionConfig, SessionStats};
pub use transcript::{SessionTranscript, TranscriptEntry};
pub use upload::{HttpTranscribeClient, TranscriptionApi, UploadConfig, UploadStatus};
