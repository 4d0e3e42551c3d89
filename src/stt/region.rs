use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{TranscriptFragment, TranscriptionBackend};
use crate::audio;
use crate::error::{PipelineError, Result};

/// Bytes per binary frame pushed to the vendor socket.
const CHUNK_SIZE: usize = 4096;

/// Region-specific vendor STT over a streaming WebSocket.
///
/// One invocation opens a socket, announces the stream parameters, pushes
/// the buffer in fixed-size chunks, terminates with an `eof` frame and then
/// relays every non-empty `text` reply as a fragment until the vendor's
/// `eos` flag closes the segment. Connection or handshake failures fail the
/// invocation before any fragment is produced.
pub struct StreamingRegionStt {
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct StreamOpen<'a> {
    config: StreamParams<'a>,
}

#[derive(Debug, Serialize)]
struct StreamParams<'a> {
    sample_rate: u32,
    transaction_id: String,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamReply {
    #[serde(default)]
    text: String,
    #[serde(default)]
    eos: bool,
}

impl StreamingRegionStt {
    pub fn new(endpoint: String, model: String, api_key: Option<String>) -> Self {
        Self {
            endpoint,
            model,
            api_key,
        }
    }
}

fn stream_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Transcription {
        message: e.to_string(),
    }
}

#[async_trait]
impl TranscriptionBackend for StreamingRegionStt {
    async fn transcribe(
        &mut self,
        audio: Vec<u8>,
        _language: &str,
    ) -> Result<mpsc::Receiver<TranscriptFragment>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::Transcription {
                message: format!("API key for '{}' is not set", self.endpoint),
            })?;

        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(stream_err)?;
        request.headers_mut().insert(
            "x-api-key",
            HeaderValue::from_str(api_key).map_err(stream_err)?,
        );

        let (socket, _) = connect_async(request).await.map_err(stream_err)?;
        let (mut sink, mut source) = socket.split();

        let opening = serde_json::to_string(&StreamOpen {
            config: StreamParams {
                sample_rate: audio::SAMPLE_RATE,
                transaction_id: Uuid::new_v4().to_string(),
                model: &self.model,
            },
        })
        .map_err(stream_err)?;
        sink.send(WsMessage::Text(opening)).await.map_err(stream_err)?;

        for chunk in audio.chunks(CHUNK_SIZE) {
            sink.send(WsMessage::Binary(chunk.to_vec()))
                .await
                .map_err(stream_err)?;
        }
        sink.send(WsMessage::Text(r#"{"eof": 1}"#.to_string()))
            .await
            .map_err(stream_err)?;

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            while let Some(incoming) = source.next().await {
                let message = match incoming {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("Region stream read failed: {}", e);
                        break;
                    }
                };
                let WsMessage::Text(payload) = message else {
                    continue;
                };
                let reply: StreamReply = match serde_json::from_str(&payload) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Unparseable region stream reply: {}", e);
                        continue;
                    }
                };

                if !reply.text.trim().is_empty()
                    && tx.send(TranscriptFragment::Text(reply.text)).await.is_err()
                {
                    break;
                }
                if reply.eos {
                    debug!("Region stream signalled end of segment");
                    break;
                }
            }
            let _ = sink.send(WsMessage::Close(None)).await;
        });

        Ok(rx)
    }

    fn name(&self) -> &str {
        "region-stream"
    }
}
