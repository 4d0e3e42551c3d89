use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::endpoint::UtteranceBoundary;
use super::{TranscriptFragment, TranscriptionBackend};
use crate::audio;
use crate::error::{PipelineError, Result};

/// Minimum samples worth running inference on (10 ms at 16 kHz).
const MIN_SAMPLES: usize = 160;

/// An in-process recognizer. Implementations are blocking and CPU-bound;
/// the backend runs them on the blocking thread pool.
pub trait SpeechEngine: Send + Sync {
    fn transcribe(&self, samples: &[i16], language: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Local-model transcription with utterance gating.
///
/// Audio too short or judged silent by the configured boundary strategy
/// skips inference entirely and yields only the end-of-utterance marker, as
/// does an empty engine result. Otherwise the engine's text is yielded,
/// followed by the marker when the text-level heuristic fires.
pub struct LocalModelStt {
    engine: Arc<dyn SpeechEngine>,
    boundary: Box<dyn UtteranceBoundary>,
}

impl LocalModelStt {
    pub fn new(engine: Arc<dyn SpeechEngine>, boundary: Box<dyn UtteranceBoundary>) -> Self {
        Self { engine, boundary }
    }
}

#[async_trait]
impl TranscriptionBackend for LocalModelStt {
    async fn transcribe(
        &mut self,
        audio: Vec<u8>,
        language: &str,
    ) -> Result<mpsc::Receiver<TranscriptFragment>> {
        let samples = audio::samples_from_le_bytes(&audio);
        let (tx, rx) = mpsc::channel(2);

        if samples.len() < MIN_SAMPLES {
            debug!(
                "Local engine skipping {}-sample buffer (too short)",
                samples.len()
            );
            let _ = tx.send(TranscriptFragment::EndOfUtterance).await;
            return Ok(rx);
        }

        if self.boundary.observe_audio(&samples) {
            debug!(
                "Boundary strategy '{}' judged the buffer silent",
                self.boundary.name()
            );
            let _ = tx.send(TranscriptFragment::EndOfUtterance).await;
            return Ok(rx);
        }

        let engine = Arc::clone(&self.engine);
        let lang = language.to_string();
        let text = tokio::task::spawn_blocking(move || engine.transcribe(&samples, &lang))
            .await
            .map_err(|e| PipelineError::Transcription {
                message: format!("Engine task failed: {}", e),
            })??;

        if text.trim().is_empty() {
            let _ = tx.send(TranscriptFragment::EndOfUtterance).await;
            return Ok(rx);
        }

        let marker = self.boundary.observe_text(&text);
        let _ = tx.send(TranscriptFragment::Text(text)).await;
        if marker {
            let _ = tx.send(TranscriptFragment::EndOfUtterance).await;
        }
        Ok(rx)
    }

    fn name(&self) -> &str {
        "local-model"
    }
}

/// Scripted speech engine for tests. Each queued reply answers one
/// `transcribe` call; an exhausted script transcribes silence (empty text).
pub struct MockEngine {
    name: String,
    script: Mutex<VecDeque<EngineReply>>,
}

enum EngineReply {
    Text(String),
    Failure(String),
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            name: "mock-engine".to_string(),
            script: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_reply(self, text: &str) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(EngineReply::Text(text.to_string()));
        }
        self
    }

    pub fn with_failure(self, message: &str) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(EngineReply::Failure(message.to_string()));
        }
        self
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechEngine for MockEngine {
    fn transcribe(&self, _samples: &[i16], _language: &str) -> Result<String> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| PipelineError::Transcription {
                message: "Mock engine lock poisoned".to_string(),
            })?;
        match script.pop_front() {
            Some(EngineReply::Text(text)) => Ok(text),
            Some(EngineReply::Failure(message)) => Err(PipelineError::Transcription { message }),
            None => Ok(String::new()),
        }
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
