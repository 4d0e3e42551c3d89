pub mod cloud;
pub mod endpoint;
pub mod local;
pub mod region;

use std::collections::VecDeque;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{PipelineError, Result};

pub use cloud::ChunkedCloudStt;
pub use endpoint::{
    boundary_from_entry, NeverBoundary, RepeatedPhraseBoundary, TrailingSilenceBoundary,
    UtteranceBoundary,
};
pub use local::{LocalModelStt, MockEngine, SpeechEngine};
pub use region::StreamingRegionStt;

/// One piece of output from a transcription invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptFragment {
    /// Transcribed text for (part of) the submitted audio.
    Text(String),
    /// The backend judged that the speaker has stopped. Carries no text;
    /// downstream this flushes whatever candidate has accumulated.
    EndOfUtterance,
}

/// A speech-to-text capability.
///
/// One invocation converts one drained audio buffer into a finite sequence of
/// fragments, delivered lazily over a channel. The channel cannot be
/// replayed; callers consume it to exhaustion. An `Err` from `transcribe`
/// means the invocation as a whole failed and no fragments were produced;
/// the session controller logs it and moves on to the next frame.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    async fn transcribe(
        &mut self,
        audio: Vec<u8>,
        language: &str,
    ) -> Result<mpsc::Receiver<TranscriptFragment>>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// The backend kinds the capability table can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttKind {
    /// Buffer-at-a-time upload to an OpenAI-compatible transcription API.
    CloudChunked,
    /// Vendor WebSocket that streams partial results for one buffer.
    RegionStream,
    /// In-process engine behind [`SpeechEngine`].
    LocalModel,
}

impl FromStr for SttKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cloud-chunked" => Ok(SttKind::CloudChunked),
            "region-stream" => Ok(SttKind::RegionStream),
            "local-model" => Ok(SttKind::LocalModel),
            other => Err(other.to_string()),
        }
    }
}

/// Scripted transcription backend for tests.
///
/// Each queued entry answers one `transcribe` call, in order. An exhausted
/// script yields empty invocations (no fragments), which mirrors a backend
/// hearing only silence.
pub struct MockStt {
    name: String,
    script: VecDeque<ScriptedCall>,
}

enum ScriptedCall {
    Fragments(Vec<TranscriptFragment>),
    Failure(String),
}

impl MockStt {
    pub fn new() -> Self {
        Self {
            name: "mock-stt".to_string(),
            script: VecDeque::new(),
        }
    }

    /// Queue one invocation that yields a single text fragment.
    pub fn with_text(self, text: &str) -> Self {
        self.with_fragments(vec![TranscriptFragment::Text(text.to_string())])
    }

    /// Queue one invocation with an explicit fragment sequence.
    pub fn with_fragments(mut self, fragments: Vec<TranscriptFragment>) -> Self {
        self.script.push_back(ScriptedCall::Fragments(fragments));
        self
    }

    /// Queue one invocation that fails outright.
    pub fn with_failure(mut self, message: &str) -> Self {
        self.script.push_back(ScriptedCall::Failure(message.to_string()));
        self
    }
}

impl Default for MockStt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptionBackend for MockStt {
    async fn transcribe(
        &mut self,
        _audio: Vec<u8>,
        _language: &str,
    ) -> Result<mpsc::Receiver<TranscriptFragment>> {
        match self.script.pop_front() {
            Some(ScriptedCall::Fragments(fragments)) => {
                let (tx, rx) = mpsc::channel(fragments.len().max(1));
                for fragment in fragments {
                    let _ = tx.send(fragment).await;
                }
                Ok(rx)
            }
            Some(ScriptedCall::Failure(message)) => {
                Err(PipelineError::Transcription { message })
            }
            None => {
                let (_tx, rx) = mpsc::channel(1);
                Ok(rx)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
