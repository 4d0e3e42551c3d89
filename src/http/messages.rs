use serde::{Deserialize, Serialize};

use crate::dispatch::ProcessedStyle;
use crate::error::{PipelineError, Result};

/// One JSON text frame from the client.
///
/// A frame carries either `audio` (base64 PCM) or `text` (a direct
/// post-processing request). `language` and `user_id` are honored on the
/// first message of a session and ignored afterwards. Unknown fields are
/// ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl InboundMessage {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| PipelineError::Protocol {
            message: e.to_string(),
        })
    }
}

/// One JSON text frame to the client: a partial transcription or the
/// processed result of a candidate span. `message_id` ties the processed
/// message back to the partials of the span it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub message_id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Transcription,
    Concise,
    Highlight,
}

impl From<ProcessedStyle> for MessageKind {
    fn from(style: ProcessedStyle) -> Self {
        match style {
            ProcessedStyle::Concise => MessageKind::Concise,
            ProcessedStyle::Highlight => MessageKind::Highlight,
        }
    }
}
