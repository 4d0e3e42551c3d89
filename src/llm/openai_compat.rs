use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ChatBackend;
use crate::error::{PipelineError, Result};

/// Chat against an OpenAI-style `chat/completions` endpoint. Groq and other
/// compatible vendors differ only in base URL and model name, so one adapter
/// covers them all.
pub struct OpenAiCompatChat {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl OpenAiCompatChat {
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
impl ChatBackend for OpenAiCompatChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::ChatCompletion {
                message: format!("API key for '{}' is not set", self.endpoint),
            })?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::ChatCompletion {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::ChatCompletion {
                message: format!("{} returned {}: {}", self.endpoint, status, body),
            });
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| PipelineError::ChatCompletion {
                message: e.to_string(),
            })?;

        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| PipelineError::ChatCompletion {
                message: "Reply carried no choices".to_string(),
            })
    }

    fn name(&self) -> &str {
        "openai-compat"
    }
}
