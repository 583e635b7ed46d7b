use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::audio::AudioCapture;
use crate::config::Config;
use crate::recognizer::SpeechEngine;
use crate::session::RecordingSession;
use crate::upload::TranscriptionApi;

/// Builds a capture source for each new session
pub type CaptureBuilder = dyn Fn() -> anyhow::Result<Box<dyn AudioCapture>> + Send + Sync;
/// Builds a speech engine for each new session
pub type EngineBuilder = dyn Fn() -> Box<dyn SpeechEngine> + Send + Sync;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active recording sessions (session_id → session)
    pub sessions: Arc<RwLock<HashMap<String, Arc<RecordingSession>>>>,
    pub config: Arc<Config>,
    pub client: Arc<dyn TranscriptionApi>,
    pub capture_factory: Arc<CaptureBuilder>,
    pub engine_factory: Arc<EngineBuilder>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        client: Arc<dyn TranscriptionApi>,
        capture_factory: Arc<CaptureBuilder>,
        engine_factory: Arc<EngineBuilder>,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
            client,
            capture_factory,
            engine_factory,
        }
    }
}
