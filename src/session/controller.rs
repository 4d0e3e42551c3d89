use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::AudioBuffer;
use crate::dispatch::{PostProcessor, ProcessOutcome, WorkerPool};
use crate::error::{PipelineError, Result};
use crate::http::messages::{InboundMessage, MessageKind, OutboundMessage};
use crate::registry::BackendResolver;
use crate::session::SessionConfig;
use crate::store::{session_key, SessionRecord, SessionStore};
use crate::stt::{TranscriptFragment, TranscriptionBackend};
use crate::transcript::{AggregatorDecision, TranscriptAggregator};

const DEFAULT_USER: &str = "default_user";

/// Lifecycle of one streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection accepted, no media seen yet.
    Open,
    /// Steady state: frames arrive, fragments accumulate, jobs dispatch.
    Streaming,
    /// Transport is gone; pending jobs are being collected.
    Draining,
    /// Terminal. No further mutation.
    Closed,
}

/// Final accounting for a finished session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: String,
    pub language: String,
    pub full_transcript: String,
    pub processed_transcript: String,
    pub jobs_dispatched: u64,
    pub jobs_merged: u64,
    pub jobs_skipped: u64,
    pub jobs_failed: u64,
}

/// One finished post-processing job, marshaled back to the controller task.
struct JobCompletion {
    seq: u64,
    message_id: String,
    outcome: Result<ProcessOutcome>,
}

/// Owns all state for one connection and serializes every mutation.
///
/// The controller task is the only writer of the buffer, the aggregator and
/// the merge bookkeeping. Post-processing jobs run on the shared worker pool
/// and report back over a completion channel consumed here, so out-of-order
/// completions never touch session state directly.
///
/// Results merge in dispatch order: each job gets a sequence number at
/// submission, completions park in a reorder buffer until every earlier job
/// has resolved, and the oldest undelivered job is given a bounded wait
/// before it is written off as failed and skipped.
pub struct SessionController {
    config: SessionConfig,
    resolver: Arc<dyn BackendResolver>,
    store: Arc<dyn SessionStore>,
    workers: WorkerPool,
    outbound: mpsc::Sender<OutboundMessage>,

    state: SessionState,
    buffer: AudioBuffer,
    aggregator: TranscriptAggregator,
    processed: String,

    language: Option<String>,
    user_id: Option<String>,
    stt: Option<Box<dyn TranscriptionBackend>>,
    processor: Option<Arc<PostProcessor>>,

    /// Correlation id for the current candidate span. Minted when the span's
    /// first partial goes out, consumed when the span is captured for
    /// dispatch, delivered again on the span's processed message.
    message_id: Option<String>,

    next_seq: u64,
    next_deliver: u64,
    in_flight: BTreeMap<u64, Instant>,
    completed: BTreeMap<u64, JobCompletion>,
    jobs_merged: u64,
    jobs_skipped: u64,
    jobs_failed: u64,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        resolver: Arc<dyn BackendResolver>,
        store: Arc<dyn SessionStore>,
        workers: WorkerPool,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        let aggregator = TranscriptAggregator::new(config.word_threshold);
        Self {
            config,
            resolver,
            store,
            workers,
            outbound,
            state: SessionState::Open,
            buffer: AudioBuffer::new(),
            aggregator,
            processed: String::new(),
            language: None,
            user_id: None,
            stt: None,
            processor: None,
            message_id: None,
            next_seq: 0,
            next_deliver: 0,
            in_flight: BTreeMap::new(),
            completed: BTreeMap::new(),
            jobs_merged: 0,
            jobs_skipped: 0,
            jobs_failed: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session until the inbound channel closes, then drain.
    ///
    /// Returns an error only for configuration failures (no backend mapped
    /// for the requested language); per-frame transcription trouble is
    /// logged and survived.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<InboundMessage>,
    ) -> Result<SessionSummary> {
        info!("Session {} open", self.config.session_id);
        let (completions_tx, mut completions) = mpsc::channel::<JobCompletion>(64);

        loop {
            let head_deadline = self.head_deadline();

            tokio::select! {
                message = inbound.recv() => {
                    match message {
                        Some(message) => {
                            if let Err(e) = self.on_message(message, &completions_tx).await {
                                self.abort(&e);
                                return Err(e);
                            }
                        }
                        None => break,
                    }
                }
                Some(completion) = completions.recv() => {
                    self.on_completion(completion).await;
                }
                _ = sleep_until(head_deadline.unwrap_or_else(Instant::now)),
                    if head_deadline.is_some() =>
                {
                    self.expire_head().await;
                }
            }
        }

        self.drain(&completions_tx, &mut completions).await;
        Ok(self.into_summary())
    }

    async fn on_message(
        &mut self,
        message: InboundMessage,
        completions_tx: &mpsc::Sender<JobCompletion>,
    ) -> Result<()> {
        if message.audio.is_none() && message.text.is_none() {
            warn!(
                "Session {} received a frame with neither audio nor text; discarding",
                self.config.session_id
            );
            return Ok(());
        }

        self.ensure_identity(&message);

        if let Some(audio) = &message.audio {
            self.on_audio(audio, completions_tx).await?;
        }
        if let Some(text) = &message.text {
            self.on_text(text, completions_tx).await?;
        }

        Ok(())
    }

    /// Pin language and user id from the first frame that carries media.
    /// Later frames cannot change them.
    fn ensure_identity(&mut self, message: &InboundMessage) {
        if self.language.is_none() {
            let language = message
                .language
                .clone()
                .unwrap_or_else(|| self.config.default_language.clone());
            info!("Session {} language '{}'", self.config.session_id, language);
            self.language = Some(language);
        }
        if self.user_id.is_none() {
            self.user_id = Some(
                message
                    .user_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_USER.to_string()),
            );
        }
    }

    fn effective_language(&self) -> String {
        self.language
            .clone()
            .unwrap_or_else(|| self.config.default_language.clone())
    }

    fn ensure_stt(&mut self) -> Result<()> {
        if self.stt.is_some() {
            return Ok(());
        }
        let language = self.effective_language();
        let stt = self.resolver.resolve_stt(&language)?;
        info!(
            "Session {} transcribes '{}' with {}",
            self.config.session_id,
            language,
            stt.name()
        );
        self.stt = Some(stt);
        Ok(())
    }

    fn ensure_processor(&mut self) -> Result<()> {
        if self.processor.is_some() {
            return Ok(());
        }
        let language = self.effective_language();
        let chat = self.resolver.resolve_llm(&language)?;
        debug!(
            "Session {} post-processes with {}",
            self.config.session_id,
            chat.name()
        );
        self.processor = Some(Arc::new(PostProcessor::new(chat)));
        Ok(())
    }

    async fn on_audio(
        &mut self,
        audio_b64: &str,
        completions_tx: &mpsc::Sender<JobCompletion>,
    ) -> Result<()> {
        self.ensure_stt()?;
        self.ensure_processor()?;
        self.state = SessionState::Streaming;

        let bytes = match STANDARD.decode(audio_b64) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    "Session {} dropping frame with undecodable audio: {}",
                    self.config.session_id, e
                );
                return Ok(());
            }
        };

        self.buffer.append(&bytes);
        let frame = self.buffer.drain();
        if frame.is_empty() {
            return Ok(());
        }

        let language = self.effective_language();
        let deadline = Instant::now() + self.config.transcription_timeout;
        let Some(stt) = self.stt.as_mut() else {
            return Ok(());
        };

        // One deadline covers the invocation and its whole fragment
        // sequence. A failure here is transient: the frame is dropped and
        // the session keeps buffering.
        let mut fragments = match timeout_at(deadline, stt.transcribe(frame, &language)).await {
            Ok(Ok(fragments)) => fragments,
            Ok(Err(e)) => {
                warn!(
                    "Session {} transcription failed; dropping frame: {}",
                    self.config.session_id, e
                );
                return Ok(());
            }
            Err(_) => {
                warn!(
                    "Session {} transcription exceeded {:?}; dropping frame",
                    self.config.session_id, self.config.transcription_timeout
                );
                return Ok(());
            }
        };

        loop {
            let fragment = match timeout_at(deadline, fragments.recv()).await {
                Ok(Some(fragment)) => fragment,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Session {} fragment stream exceeded the transcription deadline",
                        self.config.session_id
                    );
                    break;
                }
            };
            self.on_fragment(&fragment, completions_tx).await;
        }

        Ok(())
    }

    async fn on_fragment(
        &mut self,
        fragment: &TranscriptFragment,
        completions_tx: &mpsc::Sender<JobCompletion>,
    ) {
        match self.aggregator.consume(fragment) {
            AggregatorDecision::Continue => {}
            AggregatorDecision::EmitPartial => {
                self.send_partial(fragment).await;
            }
            AggregatorDecision::ThresholdReached { candidate } => {
                // The crossing fragment still goes out as a partial under
                // the span's id before the span is captured.
                self.send_partial(fragment).await;
                let message_id = self.message_id.take().unwrap_or_else(new_message_id);
                self.dispatch(candidate, message_id, completions_tx);
            }
            AggregatorDecision::EndOfUtterance { candidate } => {
                let message_id = self.message_id.take().unwrap_or_else(new_message_id);
                self.dispatch(candidate, message_id, completions_tx);
            }
        }
    }

    async fn send_partial(&mut self, fragment: &TranscriptFragment) {
        let TranscriptFragment::Text(text) = fragment else {
            return;
        };
        let message_id = self.message_id.get_or_insert_with(new_message_id).clone();
        let message = OutboundMessage {
            message_id,
            text: text.trim().to_string(),
            kind: MessageKind::Transcription,
        };
        if self.outbound.send(message).await.is_err() {
            debug!(
                "Session {} outbound channel closed; partial not delivered",
                self.config.session_id
            );
        }
    }

    /// Submit a captured candidate to the worker pool. Never waits: the job
    /// task acquires its pool permit itself.
    fn dispatch(
        &mut self,
        candidate: String,
        message_id: String,
        completions_tx: &mpsc::Sender<JobCompletion>,
    ) {
        let Some(processor) = self.processor.clone() else {
            warn!(
                "Session {} has no post-processor; discarding candidate",
                self.config.session_id
            );
            return;
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight.insert(seq, Instant::now());
        debug!(
            "Session {} dispatched job {} ({} chars)",
            self.config.session_id,
            seq,
            candidate.len()
        );

        let completions = completions_tx.clone();
        self.workers.submit(async move {
            let outcome = processor.process(&candidate).await;
            let _ = completions
                .send(JobCompletion {
                    seq,
                    message_id,
                    outcome,
                })
                .await;
        });
    }

    async fn on_text(
        &mut self,
        text: &str,
        completions_tx: &mpsc::Sender<JobCompletion>,
    ) -> Result<()> {
        self.ensure_processor()?;
        self.state = SessionState::Streaming;

        let trimmed = text.trim();
        if trimmed.is_empty() {
            warn!(
                "Session {} received an empty text frame; discarding",
                self.config.session_id
            );
            return Ok(());
        }

        // Text frames bypass the transcript; each one is its own span.
        self.dispatch(trimmed.to_string(), new_message_id(), completions_tx);
        Ok(())
    }

    async fn on_completion(&mut self, completion: JobCompletion) {
        if completion.seq < self.next_deliver {
            debug!(
                "Session {} job {} completed after its wait expired; dropping",
                self.config.session_id, completion.seq
            );
            return;
        }
        self.in_flight.remove(&completion.seq);
        self.completed.insert(completion.seq, completion);
        self.deliver_ready().await;
    }

    async fn deliver_ready(&mut self) {
        while let Some(completion) = self.completed.remove(&self.next_deliver) {
            self.next_deliver += 1;
            self.merge(completion).await;
        }
    }

    async fn merge(&mut self, completion: JobCompletion) {
        match completion.outcome {
            Ok(ProcessOutcome::Processed(result)) => {
                self.jobs_merged += 1;
                self.processed.push_str(&result.text);
                self.processed.push(' ');
                self.checkpoint().await;

                let message = OutboundMessage {
                    message_id: completion.message_id,
                    text: result.text,
                    kind: MessageKind::from(result.style),
                };
                if self.outbound.send(message).await.is_err() {
                    debug!(
                        "Session {} outbound channel closed; result not delivered",
                        self.config.session_id
                    );
                }
            }
            Ok(ProcessOutcome::Skip) => {
                self.jobs_skipped += 1;
                debug!(
                    "Session {} job {} returned the no-op sentinel; nothing merged",
                    self.config.session_id, completion.seq
                );
            }
            Err(e) => {
                self.jobs_failed += 1;
                warn!(
                    "Session {} job {} failed; its span stays unprocessed: {}",
                    self.config.session_id, completion.seq, e
                );
            }
        }
    }

    /// Write the durability checkpoint. Idempotent upsert keyed by user, so
    /// a retried or repeated write is harmless. Store trouble is logged, not
    /// escalated; the next merge retries naturally.
    async fn checkpoint(&mut self) {
        let Some(user_id) = self.user_id.clone() else {
            return;
        };
        let record = SessionRecord {
            transcription: self.aggregator.full_transcript().to_string(),
            processed_transcription: self.processed.trim_end().to_string(),
        };
        if let Err(e) = self.store.write(&session_key(&user_id), &record).await {
            warn!(
                "Session {} checkpoint write failed: {}",
                self.config.session_id, e
            );
        }
    }

    /// Deadline for the oldest undelivered job, when it is still in flight.
    /// `None` when its result is already buffered or nothing is pending.
    fn head_deadline(&self) -> Option<Instant> {
        if self.completed.contains_key(&self.next_deliver) {
            return None;
        }
        let dispatched = self.in_flight.get(&self.next_deliver)?;
        Some(*dispatched + self.config.completion_wait)
    }

    /// The oldest undelivered job exceeded the completion wait: record the
    /// gap and move on so buffered later results can flow.
    async fn expire_head(&mut self) {
        let seq = self.next_deliver;
        if self.in_flight.remove(&seq).is_none() {
            return;
        }
        warn!(
            "Session {} job {} exceeded the {:?} completion wait; skipping it",
            self.config.session_id, seq, self.config.completion_wait
        );
        self.jobs_failed += 1;
        self.next_deliver += 1;
        self.deliver_ready().await;
    }

    /// Disconnect path. Flushes any residual candidate as a final job, then
    /// collects every outstanding job up to the bounded wait per head, and
    /// writes the final checkpoint regardless of outcomes.
    async fn drain(
        &mut self,
        completions_tx: &mpsc::Sender<JobCompletion>,
        completions: &mut mpsc::Receiver<JobCompletion>,
    ) {
        self.state = SessionState::Draining;
        info!(
            "Session {} draining ({} jobs outstanding)",
            self.config.session_id,
            self.next_seq - self.next_deliver
        );

        if let Some(candidate) = self.aggregator.drain_residual() {
            let message_id = self.message_id.take().unwrap_or_else(new_message_id);
            self.dispatch(candidate, message_id, completions_tx);
        }

        while self.next_deliver < self.next_seq {
            if self.completed.contains_key(&self.next_deliver) {
                self.deliver_ready().await;
                continue;
            }

            let Some(dispatched) = self.in_flight.get(&self.next_deliver).copied() else {
                // Neither buffered nor in flight: the job never reported.
                error!(
                    "Session {} lost track of job {}; treating it as failed",
                    self.config.session_id, self.next_deliver
                );
                self.jobs_failed += 1;
                self.next_deliver += 1;
                continue;
            };

            match timeout_at(dispatched + self.config.completion_wait, completions.recv()).await {
                Ok(Some(completion)) => self.on_completion(completion).await,
                Ok(None) => break,
                Err(_) => self.expire_head().await,
            }
        }

        self.checkpoint().await;
        self.state = SessionState::Closed;
        info!(
            "Session {} closed ({} merged, {} skipped, {} failed)",
            self.config.session_id, self.jobs_merged, self.jobs_skipped, self.jobs_failed
        );
    }

    fn abort(&mut self, error: &PipelineError) {
        error!("Session {} aborted: {}", self.config.session_id, error);
        self.state = SessionState::Closed;
    }

    fn into_summary(self) -> SessionSummary {
        let full_transcript = self.aggregator.full_transcript().to_string();
        let processed_transcript = self.processed.trim_end().to_string();
        SessionSummary {
            session_id: self.config.session_id,
            user_id: self.user_id.unwrap_or_else(|| DEFAULT_USER.to_string()),
            language: self.language.unwrap_or(self.config.default_language),
            full_transcript,
            processed_transcript,
            jobs_dispatched: self.next_seq,
            jobs_merged: self.jobs_merged,
            jobs_skipped: self.jobs_skipped,
            jobs_failed: self.jobs_failed,
        }
    }
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}
