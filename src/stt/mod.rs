//! Speech-to-text engines.

pub mod engine;
#[cfg(feature = "vosk")]
pub mod vosk;
