use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ChatBackend;
use crate::error::{PipelineError, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Chat against the Anthropic `messages` endpoint.
pub struct AnthropicChat {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<UserMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesReply {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl AnthropicChat {
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
impl ChatBackend for AnthropicChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::ChatCompletion {
                message: format!("API key for '{}' is not set", self.endpoint),
            })?;

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            messages: vec![UserMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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

        let reply: MessagesReply =
            response
                .json()
                .await
                .map_err(|e| PipelineError::ChatCompletion {
                    message: e.to_string(),
                })?;

        reply
            .content
            .into_iter()
            .map(|block| block.text)
            .find(|text| !text.is_empty())
            .ok_or_else(|| PipelineError::ChatCompletion {
                message: "Reply carried no text content".to_string(),
            })
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
