// Integration tests for the streaming session controller
//
// These tests drive a controller over channels with scripted backends and
// verify partial delivery, dispatch-order merging, drain behavior and
// failure handling.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use streamscribe::http::messages::{InboundMessage, MessageKind, OutboundMessage};
use streamscribe::{
    session_key, BackendResolver, ChatBackend, MemorySessionStore, MockChat, MockStt,
    PipelineError, SessionConfig, SessionController, SessionState, SessionStore, SessionSummary,
    TranscriptFragment, TranscriptionBackend, WorkerPool,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

// ============================================================================
// Test fixtures
// ============================================================================

/// Hands out one scripted transcription backend and one shared chat backend.
struct TestResolver {
    stt: Mutex<Option<Box<dyn TranscriptionBackend>>>,
    chat: Mutex<Option<Arc<dyn ChatBackend>>>,
}

impl TestResolver {
    fn new(
        stt: impl TranscriptionBackend + 'static,
        chat: impl ChatBackend + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            stt: Mutex::new(Some(Box::new(stt))),
            chat: Mutex::new(Some(Arc::new(chat))),
        })
    }

    fn without_backends() -> Arc<Self> {
        Arc::new(Self {
            stt: Mutex::new(None),
            chat: Mutex::new(None),
        })
    }
}

impl BackendResolver for TestResolver {
    fn resolve_stt(&self, language: &str) -> streamscribe::Result<Box<dyn TranscriptionBackend>> {
        self.stt.lock().unwrap().take().ok_or_else(|| {
            PipelineError::UnsupportedLanguage {
                language: language.to_string(),
            }
        })
    }

    fn resolve_llm(&self, language: &str) -> streamscribe::Result<Arc<dyn ChatBackend>> {
        self.chat.lock().unwrap().clone().ok_or_else(|| {
            PipelineError::UnsupportedChatModel {
                language: language.to_string(),
            }
        })
    }
}

/// Chat backend that routes on a needle in the prompt, so concurrent jobs
/// get deterministic replies and latencies. The classifier call is told
/// apart by the routing prompt's wording.
struct KeyedChat {
    routes: Vec<(String, Duration, String, String)>,
}

impl KeyedChat {
    fn new() -> Self {
        Self { routes: Vec::new() }
    }

    fn route(mut self, needle: &str, delay: Duration, decision: &str, transform: &str) -> Self {
        self.routes.push((
            needle.to_string(),
            delay,
            decision.to_string(),
            transform.to_string(),
        ));
        self
    }
}

#[async_trait]
impl ChatBackend for KeyedChat {
    async fn complete(&self, prompt: &str) -> streamscribe::Result<String> {
        for (needle, delay, decision, transform) in &self.routes {
            if prompt.contains(needle.as_str()) {
                tokio::time::sleep(*delay).await;
                let reply = if prompt.contains("routing") {
                    decision
                } else {
                    transform
                };
                return Ok(reply.clone());
            }
        }
        Err(PipelineError::ChatCompletion {
            message: format!("No scripted route matches prompt: {}", prompt),
        })
    }

    fn name(&self) -> &str {
        "keyed-chat"
    }
}

/// Backend whose invocation never returns in time.
struct SlowStt;

#[async_trait]
impl TranscriptionBackend for SlowStt {
    async fn transcribe(
        &mut self,
        _audio: Vec<u8>,
        _language: &str,
    ) -> streamscribe::Result<mpsc::Receiver<TranscriptFragment>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    fn name(&self) -> &str {
        "slow-stt"
    }
}

fn test_config(word_threshold: usize, completion_wait: Duration) -> SessionConfig {
    SessionConfig {
        session_id: "session-test".to_string(),
        word_threshold,
        completion_wait,
        transcription_timeout: Duration::from_secs(5),
        default_language: "en".to_string(),
    }
}

fn start_session(
    config: SessionConfig,
    resolver: Arc<TestResolver>,
    store: Arc<MemorySessionStore>,
) -> (
    mpsc::Sender<InboundMessage>,
    mpsc::Receiver<OutboundMessage>,
    JoinHandle<streamscribe::Result<SessionSummary>>,
) {
    let (inbound_tx, inbound_rx) = mpsc::channel(16);
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let controller =
        SessionController::new(config, resolver, store, WorkerPool::new(4), outbound_tx);
    let handle = tokio::spawn(controller.run(inbound_rx));
    (inbound_tx, outbound_rx, handle)
}

fn audio_frame() -> InboundMessage {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    InboundMessage {
        audio: Some(STANDARD.encode(vec![0u8; 640])),
        ..Default::default()
    }
}

fn text_frame(text: &str) -> InboundMessage {
    InboundMessage {
        text: Some(text.to_string()),
        ..Default::default()
    }
}

async fn collect_outbound(mut outbound: mpsc::Receiver<OutboundMessage>) -> Vec<OutboundMessage> {
    let mut messages = Vec::new();
    while let Some(message) = outbound.recv().await {
        messages.push(message);
    }
    messages
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_new_session_starts_open() {
    let resolver = TestResolver::without_backends();
    let store = Arc::new(MemorySessionStore::new());
    let (outbound_tx, _outbound_rx) = mpsc::channel(4);
    let controller = SessionController::new(
        test_config(30, Duration::from_secs(30)),
        resolver,
        store,
        WorkerPool::new(4),
        outbound_tx,
    );
    assert_eq!(controller.state(), SessionState::Open);
}

#[tokio::test]
async fn test_partials_share_span_id_with_processed_result() -> Result<()> {
    let stt = MockStt::new().with_fragments(vec![
        TranscriptFragment::Text("good morning".to_string()),
        TranscriptFragment::Text("team hello".to_string()),
    ]);
    let chat = MockChat::new().with_reply("yes").with_reply("SUMMARY");
    let resolver = TestResolver::new(stt, chat);
    let store = Arc::new(MemorySessionStore::new());

    let (inbound, outbound, handle) = start_session(
        test_config(3, Duration::from_secs(30)),
        resolver,
        store.clone(),
    );

    inbound.send(audio_frame()).await?;
    drop(inbound);

    let summary = handle.await??;
    let messages = collect_outbound(outbound).await;

    // Two partials, then the processed result, one span id throughout.
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].kind, MessageKind::Transcription);
    assert_eq!(messages[0].text, "good morning");
    assert_eq!(messages[1].kind, MessageKind::Transcription);
    assert_eq!(messages[1].text, "team hello");
    assert_eq!(messages[2].kind, MessageKind::Concise);
    assert_eq!(messages[2].text, "SUMMARY");
    assert_eq!(messages[0].message_id, messages[1].message_id);
    assert_eq!(messages[1].message_id, messages[2].message_id);

    assert_eq!(summary.full_transcript, "good morning team hello");
    assert_eq!(summary.processed_transcript, "SUMMARY");
    assert_eq!(summary.jobs_dispatched, 1);
    assert_eq!(summary.jobs_merged, 1);

    // The merge wrote the checkpoint under the default user.
    let record = store.fetch(&session_key("default_user")).await?;
    let record = record.unwrap();
    assert_eq!(record.transcription, "good morning team hello");
    assert_eq!(record.processed_transcription, "SUMMARY");

    Ok(())
}

#[tokio::test]
async fn test_results_merge_in_dispatch_order() -> Result<()> {
    // First candidate is slow to process, second is fast. The fast result
    // must wait in the reorder buffer until the slow one lands.
    let stt = MockStt::new()
        .with_text("alpha two three")
        .with_text("bravo five six");
    let chat = KeyedChat::new()
        .route("alpha", Duration::from_millis(300), "yes", "ALPHA SUMMARY")
        .route("bravo", Duration::from_millis(5), "no", "BRAVO NOTES");
    let resolver = TestResolver::new(stt, chat);
    let store = Arc::new(MemorySessionStore::new());

    let (inbound, outbound, handle) = start_session(
        test_config(3, Duration::from_secs(30)),
        resolver,
        store.clone(),
    );

    inbound.send(audio_frame()).await?;
    inbound.send(audio_frame()).await?;
    drop(inbound);

    let summary = handle.await??;
    let messages = collect_outbound(outbound).await;

    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].text, "alpha two three");
    assert_eq!(messages[1].text, "bravo five six");
    assert_eq!(messages[2].kind, MessageKind::Concise);
    assert_eq!(messages[2].text, "ALPHA SUMMARY");
    assert_eq!(messages[3].kind, MessageKind::Highlight);
    assert_eq!(messages[3].text, "BRAVO NOTES");

    // Each processed message carries its own span's id.
    assert_eq!(messages[2].message_id, messages[0].message_id);
    assert_eq!(messages[3].message_id, messages[1].message_id);
    assert_ne!(messages[0].message_id, messages[1].message_id);

    assert_eq!(summary.processed_transcript, "ALPHA SUMMARY BRAVO NOTES");
    assert_eq!(summary.jobs_dispatched, 2);
    assert_eq!(summary.jobs_merged, 2);

    let record = store.fetch(&session_key("default_user")).await?.unwrap();
    assert_eq!(record.transcription, "alpha two three bravo five six");
    assert_eq!(record.processed_transcription, "ALPHA SUMMARY BRAVO NOTES");

    Ok(())
}

#[tokio::test]
async fn test_drain_flushes_residual_candidate() -> Result<()> {
    // Six words never cross the default threshold; the disconnect flush
    // must still submit them as a final job.
    let stt = MockStt::new().with_text("a quick note before hanging up");
    let chat = MockChat::new().with_reply("no").with_reply("CALL NOTES");
    let resolver = TestResolver::new(stt, chat);
    let store = Arc::new(MemorySessionStore::new());

    let (inbound, outbound, handle) = start_session(
        test_config(30, Duration::from_secs(30)),
        resolver,
        store.clone(),
    );

    inbound.send(audio_frame()).await?;
    drop(inbound);

    let summary = handle.await??;
    let messages = collect_outbound(outbound).await;

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].kind, MessageKind::Transcription);
    assert_eq!(messages[1].kind, MessageKind::Highlight);
    assert_eq!(messages[1].text, "CALL NOTES");
    assert_eq!(messages[0].message_id, messages[1].message_id);

    assert_eq!(summary.full_transcript, "a quick note before hanging up");
    assert_eq!(summary.processed_transcript, "CALL NOTES");
    assert_eq!(summary.jobs_merged, 1);

    Ok(())
}

#[tokio::test]
async fn test_noop_sentinel_is_suppressed() -> Result<()> {
    let stt = MockStt::new().with_text("alpha two three");
    let chat = MockChat::new().with_reply("yes").with_reply("0");
    let resolver = TestResolver::new(stt, chat);
    let store = Arc::new(MemorySessionStore::new());

    let (inbound, outbound, handle) = start_session(
        test_config(3, Duration::from_secs(30)),
        resolver,
        store.clone(),
    );

    inbound.send(audio_frame()).await?;
    drop(inbound);

    let summary = handle.await??;
    let messages = collect_outbound(outbound).await;

    // Only the partial goes out; the skipped job produces no message and
    // no processed entry.
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind, MessageKind::Transcription);
    assert_eq!(summary.jobs_skipped, 1);
    assert_eq!(summary.jobs_merged, 0);
    assert_eq!(summary.processed_transcript, "");

    // The final checkpoint still records the raw transcript.
    let record = store.fetch(&session_key("default_user")).await?.unwrap();
    assert_eq!(record.transcription, "alpha two three");
    assert_eq!(record.processed_transcription, "");

    Ok(())
}

#[tokio::test]
async fn test_classifier_failure_leaves_gap() -> Result<()> {
    let stt = MockStt::new().with_text("alpha two three");
    let chat = MockChat::new().with_failure("model offline");
    let resolver = TestResolver::new(stt, chat);
    let store = Arc::new(MemorySessionStore::new());

    let (inbound, outbound, handle) =
        start_session(test_config(3, Duration::from_secs(30)), resolver, store);

    inbound.send(audio_frame()).await?;
    drop(inbound);

    let summary = handle.await??;
    let messages = collect_outbound(outbound).await;

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind, MessageKind::Transcription);
    assert_eq!(summary.jobs_failed, 1);
    assert_eq!(summary.jobs_merged, 0);
    assert_eq!(summary.processed_transcript, "");

    Ok(())
}

#[tokio::test]
async fn test_head_of_line_ceiling_skips_stuck_job() -> Result<()> {
    // The first job takes far longer than the completion wait; the second
    // finishes immediately. After the ceiling the stuck job is written off
    // and the buffered result flows while the session is still open.
    let stt = MockStt::new()
        .with_text("alpha two three")
        .with_text("bravo five six");
    let chat = KeyedChat::new()
        .route("alpha", Duration::from_secs(20), "yes", "ALPHA SUMMARY")
        .route("bravo", Duration::from_millis(1), "no", "BRAVO NOTES");
    let resolver = TestResolver::new(stt, chat);
    let store = Arc::new(MemorySessionStore::new());

    let (inbound, mut outbound, handle) = start_session(
        test_config(3, Duration::from_millis(150)),
        resolver,
        store,
    );

    inbound.send(audio_frame()).await?;
    inbound.send(audio_frame()).await?;

    let first = timeout(Duration::from_secs(2), outbound.recv()).await?.unwrap();
    let second = timeout(Duration::from_secs(2), outbound.recv()).await?.unwrap();
    assert_eq!(first.kind, MessageKind::Transcription);
    assert_eq!(second.kind, MessageKind::Transcription);

    // Delivered once the head-of-line job expires, before any disconnect.
    let third = timeout(Duration::from_secs(2), outbound.recv()).await?.unwrap();
    assert_eq!(third.kind, MessageKind::Highlight);
    assert_eq!(third.text, "BRAVO NOTES");

    drop(inbound);
    let summary = handle.await??;
    assert_eq!(summary.jobs_failed, 1);
    assert_eq!(summary.jobs_merged, 1);
    assert_eq!(summary.processed_transcript, "BRAVO NOTES");

    Ok(())
}

#[tokio::test]
async fn test_transcription_failure_drops_frame_only() -> Result<()> {
    // The first invocation fails outright; the session keeps going and the
    // second frame still produces text.
    let stt = MockStt::new()
        .with_failure("upstream returned 500")
        .with_text("still alive");
    let chat = MockChat::new().with_reply("no").with_reply("NOTES");
    let resolver = TestResolver::new(stt, chat);
    let store = Arc::new(MemorySessionStore::new());

    let (inbound, outbound, handle) =
        start_session(test_config(30, Duration::from_secs(30)), resolver, store);

    inbound.send(audio_frame()).await?;
    inbound.send(audio_frame()).await?;
    drop(inbound);

    let summary = handle.await??;
    let messages = collect_outbound(outbound).await;

    assert_eq!(summary.full_transcript, "still alive");
    assert_eq!(messages[0].text, "still alive");

    Ok(())
}

#[tokio::test]
async fn test_invalid_base64_drops_frame_only() -> Result<()> {
    let stt = MockStt::new().with_text("still alive");
    let chat = MockChat::new().with_reply("no").with_reply("NOTES");
    let resolver = TestResolver::new(stt, chat);
    let store = Arc::new(MemorySessionStore::new());

    let (inbound, _outbound, handle) =
        start_session(test_config(30, Duration::from_secs(30)), resolver, store);

    inbound
        .send(InboundMessage {
            audio: Some("!!!not base64!!!".to_string()),
            ..Default::default()
        })
        .await?;
    inbound.send(audio_frame()).await?;
    drop(inbound);

    let summary = handle.await??;
    assert_eq!(summary.full_transcript, "still alive");

    Ok(())
}

#[tokio::test]
async fn test_transcription_timeout_drops_frame() -> Result<()> {
    let chat = MockChat::new();
    let resolver = TestResolver::new(SlowStt, chat);
    let store = Arc::new(MemorySessionStore::new());

    let mut config = test_config(30, Duration::from_secs(30));
    config.transcription_timeout = Duration::from_millis(50);

    let (inbound, outbound, handle) = start_session(config, resolver, store);

    inbound.send(audio_frame()).await?;
    drop(inbound);

    let summary = handle.await??;
    let messages = collect_outbound(outbound).await;

    assert!(messages.is_empty());
    assert_eq!(summary.full_transcript, "");
    assert_eq!(summary.jobs_dispatched, 0);

    Ok(())
}

#[tokio::test]
async fn test_unmapped_language_ends_session() -> Result<()> {
    let resolver = TestResolver::without_backends();
    let store = Arc::new(MemorySessionStore::new());

    let (inbound, _outbound, handle) =
        start_session(test_config(30, Duration::from_secs(30)), resolver, store);

    inbound.send(audio_frame()).await?;
    drop(inbound);

    let error = handle.await?.unwrap_err();
    match error {
        PipelineError::UnsupportedLanguage { language } => assert_eq!(language, "en"),
        other => panic!("Expected UnsupportedLanguage, got: {}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_text_frames_bypass_transcript() -> Result<()> {
    let chat = MockChat::new().with_reply("no").with_reply("MILK NOTE");
    let resolver = TestResolver::new(MockStt::new(), chat);
    let store = Arc::new(MemorySessionStore::new());

    let (inbound, outbound, handle) =
        start_session(test_config(30, Duration::from_secs(30)), resolver, store);

    inbound.send(text_frame("remember the milk")).await?;
    drop(inbound);

    let summary = handle.await??;
    let messages = collect_outbound(outbound).await;

    // No partials for a text frame, just the processed result.
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind, MessageKind::Highlight);
    assert_eq!(messages[0].text, "MILK NOTE");
    assert_eq!(summary.full_transcript, "");
    assert_eq!(summary.processed_transcript, "MILK NOTE");

    Ok(())
}

#[tokio::test]
async fn test_frame_without_media_is_ignored() -> Result<()> {
    let chat = MockChat::new().with_reply("no").with_reply("NOTED");
    let resolver = TestResolver::new(MockStt::new(), chat);
    let store = Arc::new(MemorySessionStore::new());

    let (inbound, outbound, handle) =
        start_session(test_config(30, Duration::from_secs(30)), resolver, store);

    inbound.send(InboundMessage::default()).await?;
    inbound.send(text_frame("real content")).await?;
    drop(inbound);

    let summary = handle.await??;
    let messages = collect_outbound(outbound).await;

    assert_eq!(messages.len(), 1);
    assert_eq!(summary.jobs_dispatched, 1);
    assert_eq!(summary.processed_transcript, "NOTED");

    Ok(())
}

#[tokio::test]
async fn test_checkpoint_keyed_by_first_frame_user() -> Result<()> {
    let stt = MockStt::new().with_text("alpha two three");
    let chat = MockChat::new().with_reply("yes").with_reply("SUMMARY");
    let resolver = TestResolver::new(stt, chat);
    let store = Arc::new(MemorySessionStore::new());

    let (inbound, _outbound, handle) = start_session(
        test_config(3, Duration::from_secs(30)),
        resolver,
        store.clone(),
    );

    let mut frame = audio_frame();
    frame.user_id = Some("alice".to_string());
    frame.language = Some("en".to_string());
    inbound.send(frame).await?;
    drop(inbound);

    let summary = handle.await??;
    assert_eq!(summary.user_id, "alice");
    assert_eq!(summary.language, "en");

    let record = store.fetch(&session_key("alice")).await?.unwrap();
    assert_eq!(record.transcription, "alpha two three");
    assert!(store.fetch(&session_key("default_user")).await?.is_none());

    Ok(())
}
