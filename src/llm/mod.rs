pub mod anthropic;
pub mod openai_compat;

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{PipelineError, Result};

pub use anthropic::AnthropicChat;
pub use openai_compat::OpenAiCompatChat;

/// A single-turn chat capability: one prompt in, the model's text reply out.
/// Post-processing uses the same backend for classification and transforms.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// The chat backend kinds the capability table can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmKind {
    /// OpenAI-style `chat/completions` endpoint (also covers Groq et al.).
    OpenAiCompat,
    /// Anthropic `messages` endpoint.
    Anthropic,
}

impl FromStr for LlmKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "openai-compat" => Ok(LlmKind::OpenAiCompat),
            "anthropic" => Ok(LlmKind::Anthropic),
            other => Err(other.to_string()),
        }
    }
}

/// Scripted chat backend for tests. Each queued entry answers one
/// `complete` call in order; an exhausted script fails the call, so tests
/// notice extra backend traffic instead of silently absorbing it.
pub struct MockChat {
    name: String,
    script: Mutex<VecDeque<ScriptedReply>>,
}

enum ScriptedReply {
    Reply(String),
    Failure(String),
}

impl MockChat {
    pub fn new() -> Self {
        Self {
            name: "mock-chat".to_string(),
            script: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_reply(self, text: &str) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(ScriptedReply::Reply(text.to_string()));
        }
        self
    }

    pub fn with_failure(self, message: &str) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(ScriptedReply::Failure(message.to_string()));
        }
        self
    }
}

impl Default for MockChat {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatBackend for MockChat {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| PipelineError::ChatCompletion {
                message: "Mock chat lock poisoned".to_string(),
            })?;
        match script.pop_front() {
            Some(ScriptedReply::Reply(text)) => Ok(text),
            Some(ScriptedReply::Failure(message)) => {
                Err(PipelineError::ChatCompletion { message })
            }
            None => Err(PipelineError::ChatCompletion {
                message: "Mock chat script exhausted".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
