//! HTTP API for external session control
//!
//! - POST /sessions/start - Start a new recording session
//! - POST /sessions/stop/:id - Stop a session (flushes buffered audio)
//! - PUT /sessions/:id/plan - Update the entitlement tier mid-session
//! - GET /sessions/:id/status - Query session status
//! - GET /sessions/:id/transcript - Confirmed + interim transcript
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, CaptureBuilder, EngineBuilder};
