//! Default configuration constants for earshot.
//!
//! Shared across configuration types to keep the capture, queue and worker
//! sides agreeing on the audio format.

use std::time::Duration;

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and what the Vosk small
/// models are trained on.
pub const SAMPLE_RATE: u32 = 16000;

/// Default channel count. Recognition input is always mono.
pub const CHANNELS: u16 = 1;

/// Samples delivered per capture callback invocation (5s at 16kHz).
///
/// One block becomes one queued chunk. Larger blocks mean fewer queue
/// operations but higher latency before the worker sees new speech.
pub const BLOCK_SIZE: usize = 80_000;

/// Frames read from a chunk's container per engine feed call.
pub const SUB_CHUNK_FRAMES: usize = 4000;

/// How long the worker waits on an empty queue before stopping itself.
///
/// A liveness bound, not a correctness one: it trades an idle thread
/// against cold-restart latency when speech resumes.
pub const QUEUE_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `stop()` waits for the worker to finish its in-flight chunk
/// before abandoning it.
pub const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default recognition mode, selecting the model under `model_dir/<mode>`.
pub const MODE: &str = "production";

/// Default directory holding one model per mode.
pub const MODEL_DIR: &str = "data/models";

/// Where to obtain a model when none is installed.
pub const MODEL_DOWNLOAD_URL: &str = "https://alphacephei.com/vosk/models";

/// Stray tokens the engine emits for non-speech audio.
///
/// Vosk resolves some breath/noise artifacts to "the"; a final result
/// consisting only of such a token is treated as no voice activity.
pub const FILLER_TOKENS: &[&str] = &["the"];
