use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::{TranscriptFragment, TranscriptionBackend};
use crate::audio;
use crate::error::{PipelineError, Result};

/// Buffer-at-a-time transcription against an OpenAI-compatible
/// `audio/transcriptions` endpoint.
///
/// The drained PCM is wrapped into an in-memory WAV upload and the reply's
/// `text` field becomes a single fragment. This kind never emits an
/// end-of-utterance marker; flushing is left to the word-count threshold.
pub struct ChunkedCloudStt {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionReply {
    text: String,
}

impl ChunkedCloudStt {
    pub fn new(
        client: reqwest::Client,
        endpoint: String,
        model: String,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint,
            model,
            api_key,
        }
    }
}

#[async_trait]
impl TranscriptionBackend for ChunkedCloudStt {
    async fn transcribe(
        &mut self,
        audio: Vec<u8>,
        language: &str,
    ) -> Result<mpsc::Receiver<TranscriptFragment>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::Transcription {
                message: format!("API key for '{}' is not set", self.endpoint),
            })?;

        let wav = audio::encode_pcm16(&audio)?;
        let upload_name = format!("{}.wav", Uuid::new_v4().simple());

        let part = Part::bytes(wav)
            .file_name(upload_name)
            .mime_str("audio/wav")
            .map_err(|e| PipelineError::Transcription {
                message: e.to_string(),
            })?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", language.to_string());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::Transcription {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Transcription {
                message: format!("{} returned {}: {}", self.endpoint, status, body),
            });
        }

        let reply: TranscriptionReply =
            response
                .json()
                .await
                .map_err(|e| PipelineError::Transcription {
                    message: e.to_string(),
                })?;

        debug!("Cloud transcription returned {} chars", reply.text.len());

        let (tx, rx) = mpsc::channel(1);
        if !reply.text.trim().is_empty() {
            let _ = tx.send(TranscriptFragment::Text(reply.text)).await;
        }
        Ok(rx)
    }

    fn name(&self) -> &str {
        "cloud-chunked"
    }
}
