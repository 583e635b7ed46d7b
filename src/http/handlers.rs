use super::state::AppState;
use crate::audio::CaptureMode;
use crate::config::PlanTier;
use crate::session::{RecordingSession, SessionConfig, SessionStats};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,
    /// Capture mode (default: lecture)
    pub mode: Option<CaptureMode>,
    /// Entitlement tier (default: free)
    pub plan: Option<PlanTier>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: String,
    pub transcript: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    /// Confirmed (server-corrected) text
    pub vault: String,
    /// Volatile interim text
    pub workspace: String,
    /// What a viewer sees: vault followed by workspace
    pub visible: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlanRequest {
    pub plan: PlanTier,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions/start
/// Start a new recording session
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));

    info!("Starting session: {}", session_id);

    {
        let sessions = state.sessions.read().await;
        if sessions.contains_key(&session_id) {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: format!("Session {} is already recording", session_id),
                }),
            )
                .into_response();
        }
    }

    let settings = &state.config.session;
    let config = SessionConfig {
        session_id: session_id.clone(),
        mode: req.mode.unwrap_or_default(),
        plan: req.plan.unwrap_or_default(),
        tuning: state.config.audio.tuning.clone(),
        segment: settings.segment.clone(),
        upload: settings.upload.clone(),
        recognizer: settings.recognizer.clone(),
        final_cleanup: settings.final_cleanup,
    };

    let capture = match (state.capture_factory)() {
        Ok(capture) => capture,
        Err(e) => {
            error!("Failed to create capture source: {:#}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to create capture source: {e:#}"),
                }),
            )
                .into_response();
        }
    };

    let engine = (state.engine_factory)();
    let session = Arc::new(RecordingSession::new(
        config,
        capture,
        engine,
        Arc::clone(&state.client),
    ));

    if let Err(e) = session.start().await {
        error!("Failed to start session: {:#}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to start session: {e:#}"),
            }),
        )
            .into_response();
    }

    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(session_id.clone(), session);
    }

    info!("Session started: {}", session_id);

    (
        StatusCode::OK,
        Json(StartSessionResponse {
            session_id,
            status: "recording".to_string(),
        }),
    )
        .into_response()
}

/// POST /sessions/stop/:session_id
/// Stop a recording session (flushes the buffered tail first)
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping session: {}", session_id);

    let session = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };

    let Some(session) = session else {
        return not_found(&session_id);
    };

    match session.stop().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(StopSessionResponse {
                session_id,
                status: "stopped".to_string(),
                transcript: session.vault_text().await,
                stats,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to stop session: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to stop session: {e:#}"),
                }),
            )
                .into_response()
        }
    }
}

/// GET /sessions/:session_id/status
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => (StatusCode::OK, Json(session.stats().await)).into_response(),
        None => not_found(&session_id),
    }
}

/// GET /sessions/:session_id/transcript
pub async fn get_session_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => (
            StatusCode::OK,
            Json(TranscriptResponse {
                vault: session.vault_text().await,
                workspace: session.workspace_text().await,
                visible: session.visible_text().await,
            }),
        )
            .into_response(),
        None => not_found(&session_id),
    }
}

/// PUT /sessions/:session_id/plan
/// Update the entitlement tier mid-session
pub async fn update_session_plan(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<UpdatePlanRequest>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => {
            session.set_plan(req.plan);
            StatusCode::NO_CONTENT.into_response()
        }
        None => not_found(&session_id),
    }
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn not_found(session_id: &str) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Session {} not found", session_id),
        }),
    )
        .into_response()
}
