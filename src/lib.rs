//! earshot - streaming microphone speech recognition.
//!
//! A capture callback produces fixed-size audio chunks, a queue decouples
//! capture cadence from recognition latency, and a single background worker
//! drives an incremental speech-to-text engine, emitting text as utterances
//! are finalized.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod cli;
pub mod config;
pub mod controller;
pub mod defaults;
pub mod error;
pub mod queue;
pub mod sink;
pub mod stt;
pub mod timing;
pub mod worker;

// Core traits (capture → queue → worker → sink)
pub use audio::capture::CaptureSource;
pub use sink::{CollectorSink, StdoutSink, TranscriptSink};
pub use stt::engine::RecognitionEngine;

// Pipeline
pub use controller::{Controller, load_engine};
pub use queue::StreamQueue;
pub use worker::{WorkerManager, WorkerState};

// Error handling
pub use error::{EarshotError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when a git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }
}
