//! Pluggable output for recognized text.
//!
//! Pairs with the capture source on the input side: the worker hands every
//! finalized utterance to a [`TranscriptSink`].

use std::sync::{Arc, Mutex};
use tracing::info;

/// Receives each recognized utterance as it is finalized.
pub trait TranscriptSink: Send + 'static {
    /// Handle one recognized utterance.
    fn emit(&mut self, text: &str);

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Writes each utterance to stdout (and the result log).
#[derive(Debug, Default)]
pub struct StdoutSink;

impl TranscriptSink for StdoutSink {
    fn emit(&mut self, text: &str) {
        info!(target: "result", "Speech recognized: {}", text);
        println!("{}", text);
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// Collects utterances into a shared buffer. Useful in tests and for
/// callers that want the transcript back after shutdown.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    collected: Arc<Mutex<Vec<String>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn collected(&self) -> Vec<String> {
        self.collected
            .lock()
            .map(|texts| texts.clone())
            .unwrap_or_default()
    }
}

impl TranscriptSink for CollectorSink {
    fn emit(&mut self, text: &str) {
        if let Ok(mut texts) = self.collected.lock() {
            texts.push(text.to_string());
        }
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Forwards utterances over a channel to an interested consumer.
pub struct ChannelSink {
    tx: crossbeam_channel::Sender<String>,
}

impl ChannelSink {
    pub fn new(tx: crossbeam_channel::Sender<String>) -> Self {
        Self { tx }
    }
}

impl TranscriptSink for ChannelSink {
    fn emit(&mut self, text: &str) {
        // Receiver gone means nobody wants transcripts anymore.
        let _ = self.tx.send(text.to_string());
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_sink_accumulates_in_order() {
        let mut sink = CollectorSink::new();
        sink.emit("first");
        sink.emit("second");
        assert_eq!(sink.collected(), vec!["first", "second"]);
    }

    #[test]
    fn collector_sink_clones_share_storage() {
        let sink = CollectorSink::new();
        let mut writer = sink.clone();
        writer.emit("hello");
        assert_eq!(sink.collected(), vec!["hello"]);
    }

    #[test]
    fn channel_sink_forwards_text() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut sink = ChannelSink::new(tx);
        sink.emit("over the wire");
        assert_eq!(rx.recv().unwrap(), "over the wire");
    }

    #[test]
    fn channel_sink_tolerates_dropped_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded::<String>();
        drop(rx);
        let mut sink = ChannelSink::new(tx);
        sink.emit("nobody listening");
    }

    #[test]
    fn sinks_are_object_safe() {
        let mut sinks: Vec<Box<dyn TranscriptSink>> = vec![
            Box::new(CollectorSink::new()),
            Box::new(StdoutSink),
        ];
        for sink in &mut sinks {
            assert!(!sink.name().is_empty());
        }
    }
}
