use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::PipelineConfig;

/// Per-session pipeline settings, fixed at connection accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier.
    pub session_id: String,

    /// Words accumulated in the candidate before post-processing fires.
    pub word_threshold: usize,

    /// How long the oldest undelivered job may stay unresolved before it is
    /// treated as failed and skipped.
    pub completion_wait: Duration,

    /// Bounded wait for one transcription invocation.
    pub transcription_timeout: Duration,

    /// Language assumed when the first message does not name one.
    pub default_language: String,
}

impl SessionConfig {
    pub fn from_pipeline(pipeline: &PipelineConfig) -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            word_threshold: pipeline.word_threshold,
            completion_wait: Duration::from_secs(pipeline.completion_wait_secs),
            transcription_timeout: Duration::from_secs(pipeline.transcription_timeout_secs),
            default_language: pipeline.default_language.clone(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_pipeline(&PipelineConfig::default())
    }
}
