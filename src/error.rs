//! Error types for earshot.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EarshotError {
    // Configuration errors — fatal at construction
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Model errors — fatal at startup
    #[error(
        "Recognition model not found at {path}. \
         Download one from https://alphacephei.com/vosk/models and unpack it there."
    )]
    ModelNotFound { path: String },

    #[error("Recognition backend unavailable: {message}")]
    BackendUnavailable { message: String },

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Per-chunk errors — non-fatal, chunk dropped
    #[error("Failed to decode audio chunk: {message}")]
    Decode { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, EarshotError>;
