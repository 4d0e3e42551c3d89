use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Streaming pipeline
        .route("/v1/ws/transcription", get(handlers::ws_transcription))
        .route("/v1/languages", get(handlers::list_languages))
        // Finalization and archive queries
        .route("/v1/transcription/save", post(handlers::save_transcription))
        .route("/v1/transcriptions", get(handlers::list_transcriptions))
        .route("/v1/transcriptions/:id", get(handlers::get_transcription))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
