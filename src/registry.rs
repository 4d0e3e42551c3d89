use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crate::config::{Config, LlmEntry, SttEntry};
use crate::error::{PipelineError, Result};
use crate::llm::{AnthropicChat, ChatBackend, LlmKind, OpenAiCompatChat};
use crate::stt::{
    boundary_from_entry, ChunkedCloudStt, LocalModelStt, SpeechEngine, SttKind,
    StreamingRegionStt, TranscriptionBackend,
};

const HTTP_TIMEOUT_SECS: u64 = 60;

/// Resolution seam between sessions and the capability table.
///
/// [`BackendRegistry`] is the production implementation; tests substitute
/// scripted backends without standing up vendor adapters.
pub trait BackendResolver: Send + Sync {
    fn resolve_stt(&self, language: &str) -> Result<Box<dyn TranscriptionBackend>>;

    fn resolve_llm(&self, language: &str) -> Result<Arc<dyn ChatBackend>>;
}

/// The backend capability table: which transcription and chat backend serve
/// which language.
///
/// Built once at startup from configuration. Entries are validated eagerly:
/// unknown kinds, unknown boundary strategies and a local entry without an
/// installed engine all fail the build. A session resolves its backends once
/// on its first message and reuses them for every subsequent frame; absence
/// of a mapping at that point is a configuration error that ends the session.
pub struct BackendRegistry {
    stt: HashMap<String, SttCapability>,
    llm: HashMap<String, LlmCapability>,
    client: reqwest::Client,
    engine: Option<Arc<dyn SpeechEngine>>,
}

struct SttCapability {
    kind: SttKind,
    entry: SttEntry,
    api_key: Option<String>,
}

struct LlmCapability {
    kind: LlmKind,
    entry: LlmEntry,
    api_key: Option<String>,
}

impl BackendRegistry {
    pub fn from_config(
        config: &Config,
        engine: Option<Arc<dyn SpeechEngine>>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        let mut stt = HashMap::new();
        for (language, entry) in &config.stt {
            let kind =
                SttKind::from_str(&entry.kind).map_err(|kind| PipelineError::UnknownBackendKind {
                    kind,
                    entry: language.clone(),
                })?;
            if kind == SttKind::LocalModel {
                if engine.is_none() {
                    return Err(PipelineError::EngineMissing {
                        entry: language.clone(),
                    }
                    .into());
                }
                // Validate the boundary strategy name up front.
                boundary_from_entry(language, entry)?;
            }
            let api_key = resolve_api_key(language, entry.api_key_env.as_deref());
            stt.insert(
                language.clone(),
                SttCapability {
                    kind,
                    entry: entry.clone(),
                    api_key,
                },
            );
        }

        let mut llm = HashMap::new();
        for (language, entry) in &config.llm {
            let kind =
                LlmKind::from_str(&entry.kind).map_err(|kind| PipelineError::UnknownBackendKind {
                    kind,
                    entry: language.clone(),
                })?;
            let api_key = resolve_api_key(language, entry.api_key_env.as_deref());
            llm.insert(
                language.clone(),
                LlmCapability {
                    kind,
                    entry: entry.clone(),
                    api_key,
                },
            );
        }

        info!(
            "Capability table ready: {} transcription entries, {} chat entries",
            stt.len(),
            llm.len()
        );

        Ok(Self {
            stt,
            llm,
            client,
            engine,
        })
    }

    /// Construct the transcription backend serving a language.
    pub fn resolve_stt(&self, language: &str) -> Result<Box<dyn TranscriptionBackend>> {
        let capability =
            self.stt
                .get(language)
                .ok_or_else(|| PipelineError::UnsupportedLanguage {
                    language: language.to_string(),
                })?;

        match capability.kind {
            SttKind::CloudChunked => Ok(Box::new(ChunkedCloudStt::new(
                self.client.clone(),
                capability.entry.endpoint.clone(),
                capability.entry.model.clone(),
                capability.api_key.clone(),
            ))),
            SttKind::RegionStream => Ok(Box::new(StreamingRegionStt::new(
                capability.entry.endpoint.clone(),
                capability.entry.model.clone(),
                capability.api_key.clone(),
            ))),
            SttKind::LocalModel => {
                let engine =
                    self.engine
                        .clone()
                        .ok_or_else(|| PipelineError::EngineMissing {
                            entry: language.to_string(),
                        })?;
                let boundary = boundary_from_entry(language, &capability.entry)?;
                Ok(Box::new(LocalModelStt::new(engine, boundary)))
            }
        }
    }

    /// Construct the chat backend serving a language.
    pub fn resolve_llm(&self, language: &str) -> Result<Arc<dyn ChatBackend>> {
        let capability =
            self.llm
                .get(language)
                .ok_or_else(|| PipelineError::UnsupportedChatModel {
                    language: language.to_string(),
                })?;

        match capability.kind {
            LlmKind::OpenAiCompat => Ok(Arc::new(OpenAiCompatChat::new(
                self.client.clone(),
                capability.entry.endpoint.clone(),
                capability.entry.model.clone(),
                capability.api_key.clone(),
            ))),
            LlmKind::Anthropic => Ok(Arc::new(AnthropicChat::new(
                self.client.clone(),
                capability.entry.endpoint.clone(),
                capability.entry.model.clone(),
                capability.api_key.clone(),
            ))),
        }
    }

    /// Languages a session can actually run end to end: both a transcription
    /// and a chat entry exist.
    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self
            .stt
            .keys()
            .filter(|language| self.llm.contains_key(*language))
            .cloned()
            .collect();
        languages.sort();
        languages
    }
}

impl BackendResolver for BackendRegistry {
    fn resolve_stt(&self, language: &str) -> Result<Box<dyn TranscriptionBackend>> {
        BackendRegistry::resolve_stt(self, language)
    }

    fn resolve_llm(&self, language: &str) -> Result<Arc<dyn ChatBackend>> {
        BackendRegistry::resolve_llm(self, language)
    }
}

fn resolve_api_key(language: &str, env_name: Option<&str>) -> Option<String> {
    let name = env_name?;
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => {
            warn!(
                "Environment variable '{}' for capability entry '{}' is not set; calls will fail",
                name, language
            );
            None
        }
    }
}
