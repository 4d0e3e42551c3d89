use std::sync::Arc;

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::llm::ChatBackend;

/// Which transform a candidate received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessedStyle {
    Concise,
    Highlight,
}

impl ProcessedStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessedStyle::Concise => "concise",
            ProcessedStyle::Highlight => "highlight",
        }
    }
}

/// A post-processing job's successful output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedResult {
    pub style: ProcessedStyle,
    pub source_text: String,
    pub text: String,
}

/// Outcome of one job: transformed text, or an explicit skip when the model
/// answered with the no-op sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Processed(ProcessedResult),
    Skip,
}

/// Runs the classify-then-transform sequence for one candidate span.
///
/// The classifier decides between a concise rewrite and a keyword highlight;
/// its failure is fatal to the job and the stale candidate is not
/// resubmitted. The transform's reply is checked against the no-op sentinel
/// before it becomes a result.
pub struct PostProcessor {
    chat: Arc<dyn ChatBackend>,
}

impl PostProcessor {
    pub fn new(chat: Arc<dyn ChatBackend>) -> Self {
        Self { chat }
    }

    pub async fn process(&self, candidate: &str) -> Result<ProcessOutcome> {
        let summarize = self.should_summarize(candidate).await?;
        let (style, prompt) = if summarize {
            (ProcessedStyle::Concise, concise_prompt(candidate))
        } else {
            (ProcessedStyle::Highlight, highlight_prompt(candidate))
        };

        let reply =
            self.chat
                .complete(&prompt)
                .await
                .map_err(|e| PipelineError::Transform {
                    message: e.to_string(),
                })?;

        if is_noop_reply(&reply) {
            debug!("Transform returned the no-op sentinel; skipping");
            return Ok(ProcessOutcome::Skip);
        }

        Ok(ProcessOutcome::Processed(ProcessedResult {
            style,
            source_text: candidate.to_string(),
            text: reply.trim().to_string(),
        }))
    }

    async fn should_summarize(&self, candidate: &str) -> Result<bool> {
        let reply = self
            .chat
            .complete(&decision_prompt(candidate))
            .await
            .map_err(|e| PipelineError::Classification {
                message: e.to_string(),
            })?;
        Ok(reply.trim().to_lowercase() == "yes")
    }
}

/// The no-op convention: a reply of literal "0" or nothing at all means
/// "nothing worth reporting" and is suppressed, never forwarded as output.
pub fn is_noop_reply(reply: &str) -> bool {
    let trimmed = reply.trim();
    trimmed.is_empty() || trimmed == "0"
}

fn decision_prompt(text: &str) -> String {
    format!(
        "You are routing a span of live speech transcription. Decide whether \
         it should be rewritten as a concise summary or have its key terms \
         highlighted instead. Reply with exactly \"yes\" to summarize or \
         \"no\" to highlight. Reply with nothing else.\n\nTranscription:\n{}",
        text
    )
}

fn concise_prompt(text: &str) -> String {
    format!(
        "Rewrite the following speech transcription as concise, clear prose. \
         Remove filler words and repetitions but keep every point the speaker \
         made. Reply with the rewritten text only. If the transcription \
         contains nothing meaningful, reply with 0.\n\nTranscription:\n{}",
        text
    )
}

fn highlight_prompt(text: &str) -> String {
    format!(
        "Pick out the key terms and phrases in the following speech \
         transcription and present them as a short highlighted list. Reply \
         with the list only. If there is nothing worth highlighting, reply \
         with 0.\n\nTranscription:\n{}",
        text
    )
}
