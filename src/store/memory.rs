use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{ArchivedTranscript, NewTranscript, SessionRecord, SessionStore, TranscriptArchive};
use crate::error::Result;

/// Process-local session store. Session state lives on one process for the
/// session's lifetime, so a shared map behind a lock is all the checkpoint
/// layer needs here.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn write(&self, key: &str, record: &SessionRecord) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), record.clone());
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<SessionRecord>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Process-local transcript archive with monotonically assigned ids.
pub struct MemoryTranscriptArchive {
    rows: RwLock<Vec<ArchivedTranscript>>,
    next_id: AtomicU64,
}

impl MemoryTranscriptArchive {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryTranscriptArchive {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptArchive for MemoryTranscriptArchive {
    async fn save(&self, transcript: NewTranscript) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let row = ArchivedTranscript {
            id,
            user_id: transcript.user_id,
            language: transcript.language,
            transcription: transcript.transcription,
            processed_text: transcript.processed_text,
            saved_at: Utc::now(),
        };
        self.rows.write().await.push(row);
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<ArchivedTranscript>> {
        Ok(self.rows.read().await.clone())
    }

    async fn get(&self, id: u64) -> Result<Option<ArchivedTranscript>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|row| row.id == id)
            .cloned())
    }
}
