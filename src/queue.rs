//! The stream queue between the capture callback and the recognition worker.
//!
//! Single producer (the capture thread), single consumer (the worker).
//! `push` must never block or fail from the capture side; boundedness comes
//! from worker liveness, not channel capacity.

use crate::audio::chunk::AudioChunk;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::time::Duration;
use tracing::warn;

/// Outcome of a timed-out or closed `pop`.
///
/// `Empty` is a control-flow signal, not an error: the worker uses it to
/// decide it has been idle long enough to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// No chunk arrived within the timeout.
    Empty,
    /// All producers are gone and the queue is drained.
    Disconnected,
}

/// Thread-safe FIFO of timestamped audio chunks.
#[derive(Clone)]
pub struct StreamQueue {
    tx: Sender<AudioChunk>,
    rx: Receiver<AudioChunk>,
}

impl StreamQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Enqueue a chunk at the tail. Fire-and-forget: never blocks.
    pub fn push(&self, chunk: AudioChunk) {
        if self.tx.send(chunk).is_err() {
            // Only possible once every receiving half has been dropped,
            // i.e. during teardown. The chunk is lost, which is fine then.
            warn!(target: "queue", "Dropped chunk pushed after queue teardown");
        }
    }

    /// Dequeue the head chunk, blocking the consumer up to `timeout`.
    pub fn pop(&self, timeout: Duration) -> Result<AudioChunk, PopError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => PopError::Empty,
            RecvTimeoutError::Disconnected => PopError::Disconnected,
        })
    }

    /// Raw receiving half, for the worker's select loop.
    ///
    /// The single-consumer discipline still applies: exactly one worker
    /// drains the queue at a time.
    pub(crate) fn receiver(&self) -> Receiver<AudioChunk> {
        self.rx.clone()
    }

    /// Number of chunks currently waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for StreamQueue {
    fn default() -> Self {
        Self::new()
    }
}
