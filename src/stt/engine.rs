//! The incremental recognition engine interface.
//!
//! The engine is a stateful session bound to one sample rate: audio is fed
//! in sub-chunks and the engine reports when an utterance boundary was
//! reached, at which point the finalized hypothesis can be fetched. The
//! session persists across chunks so utterances spanning chunk boundaries
//! are not lost.

use crate::error::{EarshotError, Result};
use std::collections::VecDeque;

/// A textual hypothesis, partial or final.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hypothesis {
    pub text: String,
}

impl Hypothesis {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Stateful incremental speech-to-text session.
///
/// Mutated only by the recognition worker thread; never shared across
/// concurrent chunks.
pub trait RecognitionEngine: Send {
    /// Feed one sub-chunk of mono 16-bit PCM.
    ///
    /// Returns `true` when the engine judged an utterance complete, making
    /// a finalized hypothesis available via [`final_result`].
    ///
    /// [`final_result`]: RecognitionEngine::final_result
    fn accept_waveform(&mut self, samples: &[i16]) -> Result<bool>;

    /// The finalized hypothesis for the utterance just completed.
    fn final_result(&mut self) -> Result<Hypothesis>;

    /// The tentative hypothesis for the utterance still in progress.
    fn partial_result(&mut self) -> Result<Hypothesis>;

    /// Enable or disable word-level timing in results.
    fn set_words(&mut self, enabled: bool);

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// Engine that consumes audio but never finalizes an utterance.
///
/// Stands in when no recognition backend was compiled in; the pipeline runs
/// end to end and simply never emits text.
#[derive(Debug, Default)]
pub struct NullEngine;

impl RecognitionEngine for NullEngine {
    fn accept_waveform(&mut self, _samples: &[i16]) -> Result<bool> {
        Ok(false)
    }

    fn final_result(&mut self) -> Result<Hypothesis> {
        Ok(Hypothesis::default())
    }

    fn partial_result(&mut self) -> Result<Hypothesis> {
        Ok(Hypothesis::default())
    }

    fn set_words(&mut self, _enabled: bool) {}

    fn name(&self) -> &'static str {
        "null"
    }
}

/// One scripted response to an `accept_waveform` call.
#[derive(Debug, Clone)]
pub enum FeedStep {
    /// No boundary; keep feeding.
    Continue,
    /// Utterance boundary; the given text becomes the final result.
    Boundary(String),
    /// The engine rejects this sub-chunk as malformed.
    Fail(String),
}

/// Scripted engine for tests.
///
/// Plays back a fixed sequence of [`FeedStep`]s, one per `accept_waveform`
/// call, and records how many samples each call fed.
#[derive(Debug, Default)]
pub struct MockEngine {
    script: VecDeque<FeedStep>,
    pending_final: Option<String>,
    partial: String,
    pub fed_sample_counts: Vec<usize>,
    pub words_enabled: bool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append steps to the playback script.
    pub fn with_script(mut self, steps: impl IntoIterator<Item = FeedStep>) -> Self {
        self.script.extend(steps);
        self
    }

    /// Set the partial hypothesis reported while no boundary is reached.
    pub fn with_partial(mut self, text: &str) -> Self {
        self.partial = text.to_string();
        self
    }

    /// Number of `accept_waveform` calls made so far.
    pub fn feed_count(&self) -> usize {
        self.fed_sample_counts.len()
    }
}

impl RecognitionEngine for MockEngine {
    fn accept_waveform(&mut self, samples: &[i16]) -> Result<bool> {
        self.fed_sample_counts.push(samples.len());
        match self.script.pop_front() {
            Some(FeedStep::Continue) | None => Ok(false),
            Some(FeedStep::Boundary(text)) => {
                self.pending_final = Some(text);
                Ok(true)
            }
            Some(FeedStep::Fail(message)) => Err(EarshotError::Decode { message }),
        }
    }

    fn final_result(&mut self) -> Result<Hypothesis> {
        Ok(Hypothesis::new(self.pending_final.take().unwrap_or_default()))
    }

    fn partial_result(&mut self) -> Result<Hypothesis> {
        Ok(Hypothesis::new(self.partial.clone()))
    }

    fn set_words(&mut self, enabled: bool) {
        self.words_enabled = enabled;
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
