//! Error taxonomy for the streaming pipeline.
//!
//! Configuration errors terminate a session (or startup) immediately;
//! transient backend errors are contained to the frame or job that hit them;
//! persistence errors only matter at finalization. The session controller
//! relies on this split: everything that is not a configuration error is
//! logged and dropped without tearing the session down.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// No transcription backend is configured for the requested language.
    #[error("No transcription backend configured for language '{language}'")]
    UnsupportedLanguage { language: String },

    /// No chat model is configured for the requested language.
    #[error("No chat model configured for language '{language}'")]
    UnsupportedChatModel { language: String },

    /// A capability table entry names a backend kind this build does not know.
    #[error("Unknown backend kind '{kind}' in capability entry '{entry}'")]
    UnknownBackendKind { kind: String, entry: String },

    /// A capability table entry names an utterance-boundary strategy this
    /// build does not know.
    #[error("Unknown boundary strategy '{strategy}' in capability entry '{entry}'")]
    UnknownBoundaryStrategy { strategy: String, entry: String },

    /// A capability table entry requires a local speech engine that was not installed.
    #[error("Capability entry '{entry}' needs a local speech engine, but none is installed")]
    EngineMissing { entry: String },

    /// A transcription invocation failed upstream. Treated as transient per frame.
    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    /// A transcription invocation exceeded its bounded wait.
    #[error("Transcription timed out after {seconds}s")]
    TranscriptionTimeout { seconds: u64 },

    /// A chat backend call failed at the transport or decode level.
    #[error("Chat completion failed: {message}")]
    ChatCompletion { message: String },

    /// The classify step of a post-processing job failed. Fatal to the job.
    #[error("Candidate classification failed: {message}")]
    Classification { message: String },

    /// The transform step of a post-processing job failed. Fatal to the job.
    #[error("Candidate transform failed: {message}")]
    Transform { message: String },

    /// A session store write or fetch failed.
    #[error("Session store operation failed: {message}")]
    Store { message: String },

    /// A transcript archive save failed after retries.
    #[error("Transcript archive save failed: {message}")]
    Archive { message: String },

    /// An inbound client message could not be understood. The message is
    /// discarded; the session continues.
    #[error("Malformed client message: {message}")]
    Protocol { message: String },

    /// WAV container encoding failed while preparing an upload.
    #[error("Audio encoding failed: {0}")]
    Wav(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
