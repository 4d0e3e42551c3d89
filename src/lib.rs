pub mod audio;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod llm;
pub mod registry;
pub mod session;
pub mod store;
pub mod stt;
pub mod transcript;

pub use audio::AudioBuffer;
pub use config::Config;
pub use dispatch::{PostProcessor, ProcessOutcome, ProcessedResult, ProcessedStyle, WorkerPool};
pub use error::{PipelineError, Result};
pub use http::{create_router, AppState};
pub use llm::{ChatBackend, MockChat};
pub use registry::{BackendRegistry, BackendResolver};
pub use session::{SessionConfig, SessionController, SessionState, SessionSummary};
pub use store::{
    session_key, ArchivedTranscript, MemorySessionStore, MemoryTranscriptArchive, NewTranscript,
    SessionRecord, SessionStore, TranscriptArchive,
};
pub use stt::{MockStt, TranscriptFragment, TranscriptionBackend};
pub use transcript::{AggregatorDecision, TranscriptAggregator};
