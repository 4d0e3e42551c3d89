//! HTTP API server: the streaming WebSocket endpoint plus the REST surface
//! around it
//!
//! - GET /v1/ws/transcription - WebSocket streaming session
//! - GET /v1/languages - Languages with a full backend mapping
//! - POST /v1/transcription/save - Finalize a session into the archive
//! - GET /v1/transcriptions - List archived transcriptions
//! - GET /v1/transcriptions/:id - Fetch one archived transcription
//! - GET /health - Health check

mod handlers;
pub mod messages;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
