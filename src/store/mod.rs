pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use memory::{MemorySessionStore, MemoryTranscriptArchive};

/// Incremental checkpoint record for one live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub transcription: String,
    pub processed_transcription: String,
}

impl SessionRecord {
    pub fn is_empty(&self) -> bool {
        self.transcription.is_empty() && self.processed_transcription.is_empty()
    }
}

/// Cache key under which a user's live session record is checkpointed.
pub fn session_key(user_id: &str) -> String {
    format!("transcription:{}", user_id)
}

/// Keyed incremental persistence used as the durability checkpoint during a
/// live session. Writes are idempotent upserts: rewriting a key with equal
/// fields leaves the stored state content-equal, so checkpoint retries can
/// never corrupt anything.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn write(&self, key: &str, record: &SessionRecord) -> Result<()>;

    async fn fetch(&self, key: &str) -> Result<Option<SessionRecord>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Durable archive that receives transcripts on explicit finalization.
#[async_trait]
pub trait TranscriptArchive: Send + Sync {
    /// Persist one finalized transcript and return its id.
    async fn save(&self, transcript: NewTranscript) -> Result<u64>;

    async fn list(&self) -> Result<Vec<ArchivedTranscript>>;

    async fn get(&self, id: u64) -> Result<Option<ArchivedTranscript>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTranscript {
    pub user_id: String,
    pub language: String,
    pub transcription: String,
    pub processed_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedTranscript {
    pub id: u64,
    pub user_id: String,
    pub language: String,
    pub transcription: String,
    pub processed_text: String,
    pub saved_at: DateTime<Utc>,
}
