// Tests for the session checkpoint store and the transcript archive

use anyhow::Result;
use streamscribe::{
    session_key, MemorySessionStore, MemoryTranscriptArchive, NewTranscript, SessionRecord,
    SessionStore, TranscriptArchive,
};

fn record(transcription: &str, processed: &str) -> SessionRecord {
    SessionRecord {
        transcription: transcription.to_string(),
        processed_transcription: processed.to_string(),
    }
}

fn transcript(user_id: &str) -> NewTranscript {
    NewTranscript {
        user_id: user_id.to_string(),
        language: "en".to_string(),
        transcription: "hello there".to_string(),
        processed_text: "HELLO".to_string(),
    }
}

#[test]
fn test_session_key_format() {
    assert_eq!(session_key("alice"), "transcription:alice");
    assert_eq!(session_key("default_user"), "transcription:default_user");
}

#[tokio::test]
async fn test_write_then_fetch_roundtrip() -> Result<()> {
    let store = MemorySessionStore::new();
    let key = session_key("alice");

    assert!(store.fetch(&key).await?.is_none());

    store.write(&key, &record("raw text", "processed text")).await?;
    let fetched = store.fetch(&key).await?.unwrap();
    assert_eq!(fetched.transcription, "raw text");
    assert_eq!(fetched.processed_transcription, "processed text");

    Ok(())
}

#[tokio::test]
async fn test_repeated_writes_are_idempotent() -> Result<()> {
    // Checkpoint retries rewrite the same key; the stored state must stay
    // content-equal rather than duplicating or corrupting.
    let store = MemorySessionStore::new();
    let key = session_key("bob");
    let checkpoint = record("three words here", "SUMMARY");

    store.write(&key, &checkpoint).await?;
    store.write(&key, &checkpoint).await?;
    store.write(&key, &checkpoint).await?;

    assert_eq!(store.fetch(&key).await?.unwrap(), checkpoint);

    Ok(())
}

#[tokio::test]
async fn test_later_write_wins() -> Result<()> {
    let store = MemorySessionStore::new();
    let key = session_key("bob");

    store.write(&key, &record("first", "")).await?;
    store.write(&key, &record("first second", "MERGED")).await?;

    let fetched = store.fetch(&key).await?.unwrap();
    assert_eq!(fetched.transcription, "first second");
    assert_eq!(fetched.processed_transcription, "MERGED");

    Ok(())
}

#[tokio::test]
async fn test_delete_clears_entry() -> Result<()> {
    let store = MemorySessionStore::new();
    let key = session_key("carol");

    store.write(&key, &record("to be removed", "")).await?;
    store.delete(&key).await?;
    assert!(store.fetch(&key).await?.is_none());

    // Deleting an absent key is not an error.
    store.delete(&key).await?;

    Ok(())
}

#[test]
fn test_record_emptiness() {
    assert!(record("", "").is_empty());
    assert!(!record("words", "").is_empty());
    assert!(!record("", "processed").is_empty());
}

#[tokio::test]
async fn test_archive_assigns_sequential_ids() -> Result<()> {
    let archive = MemoryTranscriptArchive::new();

    let first = archive.save(transcript("alice")).await?;
    let second = archive.save(transcript("bob")).await?;
    assert_eq!(first, 1);
    assert_eq!(second, 2);

    let rows = archive.list().await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[0].user_id, "alice");
    assert_eq!(rows[1].id, 2);
    assert_eq!(rows[1].user_id, "bob");

    Ok(())
}

#[tokio::test]
async fn test_archive_get_by_id() -> Result<()> {
    let archive = MemoryTranscriptArchive::new();
    let id = archive.save(transcript("alice")).await?;

    let row = archive.get(id).await?.unwrap();
    assert_eq!(row.user_id, "alice");
    assert_eq!(row.language, "en");
    assert_eq!(row.transcription, "hello there");
    assert_eq!(row.processed_text, "HELLO");
    assert!(row.saved_at <= chrono::Utc::now());

    assert!(archive.get(999).await?.is_none());

    Ok(())
}
