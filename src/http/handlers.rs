use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::messages::{InboundMessage, OutboundMessage};
use super::state::AppState;
use crate::registry::BackendResolver;
use crate::session::{SessionConfig, SessionController};
use crate::store::{session_key, ArchivedTranscript, NewTranscript};

const SAVE_RETRIES: u32 = 3;
const SAVE_RETRY_DELAY: Duration = Duration::from_millis(200);

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LanguagesResponse {
    pub languages: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveParams {
    pub user_id: String,
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub status: String,
    pub message: String,
    pub id: u64,
}

#[derive(Debug, Serialize)]
pub struct TranscriptionsResponse {
    pub transcriptions: Vec<ArchivedTranscript>,
}

#[derive(Debug, Serialize)]
pub struct SingleTranscriptionResponse {
    pub transcription: ArchivedTranscript,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /v1/languages
/// Languages with both a transcription and a chat backend configured
pub async fn list_languages(State(state): State<AppState>) -> impl IntoResponse {
    Json(LanguagesResponse {
        languages: state.registry.languages(),
    })
}

/// GET /v1/ws/transcription
/// Upgrade to the streaming transcription session
pub async fn ws_transcription(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Wire one WebSocket to one session controller.
///
/// The socket splits into a reader task (frames in, parsed, forwarded) and a
/// writer task (outbound messages out). The controller task owns all session
/// state; this function only plumbs channels and sends the close frame once
/// the controller finishes.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(32);
    let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundMessage>(32);

    let session_config = SessionConfig::from_pipeline(&state.pipeline);
    let session_id = session_config.session_id.clone();
    let controller = SessionController::new(
        session_config,
        state.registry.clone() as Arc<dyn BackendResolver>,
        state.store.clone(),
        state.workers.clone(),
        outbound_tx,
    );

    let run = tokio::spawn(controller.run(inbound_rx));
    let writer = tokio::spawn(write_outbound(sink, outbound_rx));
    let reader = tokio::spawn(read_inbound(stream, inbound_tx));

    let result = match run.await {
        Ok(result) => result,
        Err(e) => {
            error!("Session {} task panicked: {}", session_id, e);
            reader.abort();
            writer.abort();
            return;
        }
    };

    reader.abort();

    // The controller dropped its outbound sender, so the writer flushes the
    // queue, ends, and hands the sink back for the close frame.
    let Ok(mut sink) = writer.await else {
        return;
    };

    match result {
        Ok(summary) => {
            info!(
                "Session {} finished for '{}' ({} jobs merged, {} failed)",
                summary.session_id, summary.user_id, summary.jobs_merged, summary.jobs_failed
            );
            let _ = sink.send(Message::Close(None)).await;
        }
        Err(e) => {
            // Configuration errors end the session; tell the client why.
            let frame = CloseFrame {
                code: close_code::POLICY,
                reason: Cow::from(e.to_string()),
            };
            let _ = sink.send(Message::Close(Some(frame))).await;
        }
    }
}

/// Reader half: parse each text frame and forward it to the controller.
/// Malformed frames are logged and skipped; the session survives them.
async fn read_inbound(mut stream: SplitStream<WebSocket>, inbound: mpsc::Sender<InboundMessage>) {
    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("WebSocket receive error: {}", e);
                break;
            }
        };

        match frame {
            Message::Text(raw) => match InboundMessage::parse(&raw) {
                Ok(message) => {
                    if inbound.send(message).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Discarding malformed frame: {}", e);
                }
            },
            Message::Close(_) => break,
            // Pings are answered by the library; binary frames are not part
            // of the protocol.
            _ => {}
        }
    }
}

/// Writer half: encode outbound messages until the channel closes, then
/// return the sink so the caller can close the socket.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundMessage>,
) -> SplitSink<WebSocket, Message> {
    while let Some(message) = outbound.recv().await {
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode outbound message: {}", e);
                continue;
            }
        };
        if sink.send(Message::Text(payload)).await.is_err() {
            break;
        }
    }
    sink
}

/// POST /v1/transcription/save
/// Finalize a session: archive its record and clear the checkpoint
pub async fn save_transcription(
    State(state): State<AppState>,
    Query(params): Query<SaveParams>,
) -> impl IntoResponse {
    let key = session_key(&params.user_id);

    let record = match state.store.fetch(&key).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "No active transcription session for this user.".to_string(),
                }),
            )
                .into_response();
        }
        Err(e) => {
            error!("Failed to read session record: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to read session record: {}", e),
                }),
            )
                .into_response();
        }
    };

    if record.is_empty() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to retrieve session data.".to_string(),
            }),
        )
            .into_response();
    }

    let entry = NewTranscript {
        user_id: params.user_id.clone(),
        language: params.language.clone(),
        transcription: record.transcription.clone(),
        processed_text: record.processed_transcription.clone(),
    };

    let mut last_error = None;
    for attempt in 0..SAVE_RETRIES {
        if attempt > 0 {
            let delay = SAVE_RETRY_DELAY * 2u32.pow(attempt - 1);
            info!(
                "Retrying archive save in {:?} (attempt {}/{})",
                delay,
                attempt + 1,
                SAVE_RETRIES
            );
            tokio::time::sleep(delay).await;
        }

        match state.archive.save(entry.clone()).await {
            Ok(id) => {
                // The checkpoint has served its purpose once the archive
                // row exists. A failed delete leaves a stale cache entry,
                // not a lost transcript.
                if let Err(e) = state.store.delete(&key).await {
                    warn!("Failed to clear session record for '{}': {}", params.user_id, e);
                }
                info!(
                    "Archived transcription {} for '{}' ({})",
                    id, params.user_id, params.language
                );
                return (
                    StatusCode::OK,
                    Json(SaveResponse {
                        status: "success".to_string(),
                        message: "Transcription saved successfully.".to_string(),
                        id,
                    }),
                )
                    .into_response();
            }
            Err(e) => {
                warn!("Archive save failed: {}", e);
                last_error = Some(e);
            }
        }
    }

    let detail = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".to_string());
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("Failed to save transcription: {}", detail),
        }),
    )
        .into_response()
}

/// GET /v1/transcriptions
/// List every archived transcription
pub async fn list_transcriptions(State(state): State<AppState>) -> impl IntoResponse {
    match state.archive.list().await {
        Ok(transcriptions) => {
            (StatusCode::OK, Json(TranscriptionsResponse { transcriptions })).into_response()
        }
        Err(e) => {
            error!("Failed to list transcriptions: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to list transcriptions: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// GET /v1/transcriptions/:id
/// Fetch one archived transcription by id
pub async fn get_transcription(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    match state.archive.get(id).await {
        Ok(Some(transcription)) => {
            (StatusCode::OK, Json(SingleTranscriptionResponse { transcription })).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Transcription not found".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to fetch transcription {}: {}", id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to fetch transcription: {}", e),
                }),
            )
                .into_response()
        }
    }
}
