use std::collections::HashMap;

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Transcription capability table, keyed by language code.
    #[serde(default)]
    pub stt: HashMap<String, SttEntry>,
    /// Chat capability table, keyed by language code.
    #[serde(default)]
    pub llm: HashMap<String, LlmEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Words accumulated in the candidate before post-processing fires.
    #[serde(default = "default_word_threshold")]
    pub word_threshold: usize,
    /// Size of the shared post-processing worker pool.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// How long a merged-in-order result may be awaited before the job is
    /// treated as failed and skipped.
    #[serde(default = "default_completion_wait_secs")]
    pub completion_wait_secs: u64,
    /// Bounded wait for one transcription invocation.
    #[serde(default = "default_transcription_timeout_secs")]
    pub transcription_timeout_secs: u64,
    /// Language assumed when the first inbound message does not name one.
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            word_threshold: default_word_threshold(),
            worker_pool_size: default_worker_pool_size(),
            completion_wait_secs: default_completion_wait_secs(),
            transcription_timeout_secs: default_transcription_timeout_secs(),
            default_language: default_language(),
        }
    }
}

/// One transcription capability: which backend kind serves a language and how
/// to reach it. The credential is named indirectly (an environment variable)
/// so config files stay shareable.
#[derive(Debug, Clone, Deserialize)]
pub struct SttEntry {
    pub kind: String,
    pub model: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Utterance boundary strategy: "trailing-silence", "repeated-phrase"
    /// or "never". Only meaningful for the local backend kind.
    #[serde(default = "default_boundary")]
    pub boundary: String,
    #[serde(default = "default_silence_rms")]
    pub silence_rms: f32,
    #[serde(default = "default_silence_window_ms")]
    pub silence_window_ms: u64,
    #[serde(default = "default_repeat_limit")]
    pub repeat_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmEntry {
    pub kind: String,
    pub model: String,
    pub endpoint: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_word_threshold() -> usize {
    30
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_completion_wait_secs() -> u64 {
    30
}

fn default_transcription_timeout_secs() -> u64 {
    30
}

fn default_language() -> String {
    "en".to_string()
}

fn default_boundary() -> String {
    "never".to_string()
}

fn default_silence_rms() -> f32 {
    0.015
}

fn default_silence_window_ms() -> u64 {
    300
}

fn default_repeat_limit() -> usize {
    3
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
