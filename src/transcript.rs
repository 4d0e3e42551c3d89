use crate::stt::TranscriptFragment;

/// What the session controller should do after feeding one fragment in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatorDecision {
    /// Nothing to act on: a whitespace-only fragment, or a marker arriving
    /// with nothing left to flush.
    Continue,
    /// The fragment joined the transcript but the threshold has not fired;
    /// forward it to the caller as a partial.
    EmitPartial,
    /// The word threshold fired. The captured candidate must be dispatched
    /// for post-processing.
    ThresholdReached { candidate: String },
    /// An end-of-utterance marker flushed a non-empty candidate.
    EndOfUtterance { candidate: String },
}

/// Merges transcript fragments into the running session transcript and
/// decides when the accumulated candidate span is worth post-processing.
///
/// Capture is a single step inside `consume`: the candidate is snapshotted
/// into the returned decision and cleared before `consume` returns, so a
/// later fragment can never append to text a job already claimed. The
/// aggregator is not synchronized; the controller task is its only caller.
pub struct TranscriptAggregator {
    threshold: usize,
    full: String,
    candidate: String,
    words_since_capture: usize,
}

impl TranscriptAggregator {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            full: String::new(),
            candidate: String::new(),
            words_since_capture: 0,
        }
    }

    pub fn consume(&mut self, fragment: &TranscriptFragment) -> AggregatorDecision {
        match fragment {
            TranscriptFragment::EndOfUtterance => {
                if self.candidate.is_empty() {
                    AggregatorDecision::Continue
                } else {
                    AggregatorDecision::EndOfUtterance {
                        candidate: self.capture(),
                    }
                }
            }
            TranscriptFragment::Text(text) => {
                let trimmed = text.trim();
                let words = trimmed.split_whitespace().count();
                if words == 0 {
                    return AggregatorDecision::Continue;
                }

                self.full.push_str(trimmed);
                self.full.push(' ');
                self.candidate.push_str(trimmed);
                self.candidate.push(' ');
                self.words_since_capture += words;

                if self.words_since_capture >= self.threshold {
                    AggregatorDecision::ThresholdReached {
                        candidate: self.capture(),
                    }
                } else {
                    AggregatorDecision::EmitPartial
                }
            }
        }
    }

    /// Flush whatever candidate remains. Used on the drain path, after every
    /// fragment decision has been processed, so a span that already fired the
    /// threshold is never submitted a second time.
    pub fn drain_residual(&mut self) -> Option<String> {
        if self.candidate.is_empty() {
            None
        } else {
            Some(self.capture())
        }
    }

    fn capture(&mut self) -> String {
        self.words_since_capture = 0;
        let taken = std::mem::take(&mut self.candidate);
        taken.trim_end().to_string()
    }

    /// Full transcript accumulated so far.
    pub fn full_transcript(&self) -> &str {
        self.full.trim_end()
    }

    /// Words accumulated since the last capture.
    pub fn word_count(&self) -> usize {
        self.words_since_capture
    }

    pub fn has_candidate(&self) -> bool {
        !self.candidate.is_empty()
    }

    pub fn candidate(&self) -> &str {
        self.candidate.trim_end()
    }
}
