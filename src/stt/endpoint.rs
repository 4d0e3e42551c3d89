//! Utterance boundary detection.
//!
//! Whether a speaker has "stopped" is judged by pluggable strategies: energy
//! in the trailing audio window, a stock phrase repeated over and over, or
//! nothing at all (let the word-count threshold downstream decide). The local
//! backend consults its configured strategy on every invocation; strategies
//! carry their own state between invocations.

use crate::config::SttEntry;
use crate::error::{PipelineError, Result};

pub trait UtteranceBoundary: Send + Sync + std::fmt::Debug {
    /// Inspect the raw samples submitted for transcription. True means the
    /// audio itself indicates the speaker has stopped.
    fn observe_audio(&mut self, _samples: &[i16]) -> bool {
        false
    }

    /// Inspect a transcribed fragment. True means the text pattern indicates
    /// the speaker has stopped.
    fn observe_text(&mut self, _text: &str) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

/// No heuristic; word-count thresholds downstream do all the flushing.
#[derive(Debug)]
pub struct NeverBoundary;

impl UtteranceBoundary for NeverBoundary {
    fn name(&self) -> &'static str {
        "never"
    }
}

/// Fires when the RMS energy of the trailing window falls below a threshold.
#[derive(Debug)]
pub struct TrailingSilenceBoundary {
    threshold: f32,
    window_samples: usize,
}

impl TrailingSilenceBoundary {
    pub fn new(threshold: f32, window_ms: u64) -> Self {
        let window_samples =
            (crate::audio::SAMPLE_RATE as u64 * window_ms / 1000).max(1) as usize;
        Self {
            threshold,
            window_samples,
        }
    }
}

impl UtteranceBoundary for TrailingSilenceBoundary {
    fn observe_audio(&mut self, samples: &[i16]) -> bool {
        if samples.is_empty() {
            return false;
        }
        let start = samples.len().saturating_sub(self.window_samples);
        rms(&samples[start..]) < self.threshold
    }

    fn name(&self) -> &'static str {
        "trailing-silence"
    }
}

/// Fires when the same normalized fragment is transcribed several times in a
/// row. Recognizers under silence tend to loop on one filler phrase, so a
/// repeat streak is read as "the speaker stopped".
#[derive(Debug)]
pub struct RepeatedPhraseBoundary {
    limit: usize,
    last: Option<String>,
    streak: usize,
}

impl RepeatedPhraseBoundary {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(2),
            last: None,
            streak: 0,
        }
    }
}

impl UtteranceBoundary for RepeatedPhraseBoundary {
    fn observe_text(&mut self, text: &str) -> bool {
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return false;
        }

        if self.last.as_deref() == Some(normalized.as_str()) {
            self.streak += 1;
        } else {
            self.last = Some(normalized);
            self.streak = 1;
        }

        if self.streak >= self.limit {
            self.last = None;
            self.streak = 0;
            true
        } else {
            false
        }
    }

    fn name(&self) -> &'static str {
        "repeated-phrase"
    }
}

/// Root-mean-square energy of a sample window, normalized to [0, 1].
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / 32768.0;
            v * v
        })
        .sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// Build the boundary strategy a capability entry asks for.
pub fn boundary_from_entry(language: &str, entry: &SttEntry) -> Result<Box<dyn UtteranceBoundary>> {
    match entry.boundary.as_str() {
        "never" => Ok(Box::new(NeverBoundary)),
        "trailing-silence" => Ok(Box::new(TrailingSilenceBoundary::new(
            entry.silence_rms,
            entry.silence_window_ms,
        ))),
        "repeated-phrase" => Ok(Box::new(RepeatedPhraseBoundary::new(entry.repeat_limit))),
        other => Err(PipelineError::UnknownBoundaryStrategy {
            strategy: other.to_string(),
            entry: language.to_string(),
        }),
    }
}
