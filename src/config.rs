use crate::defaults;
use crate::error::{EarshotError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub recognition: RecognitionConfig,
    pub worker: WorkerConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per capture block (one block = one queued chunk).
    pub block_size: usize,
}

/// Recognition engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Engine backend: "vosk", or "null" to run the pipeline without
    /// recognition (deliberate choice, e.g. for plumbing tests).
    pub backend: String,
    /// Selects the model under `model_dir/<mode>`.
    pub mode: String,
    pub model_dir: PathBuf,
    /// Report word-level timing in engine results.
    pub words: bool,
    /// Final results consisting only of one of these tokens count as
    /// no voice activity.
    pub filler_tokens: Vec<String>,
}

/// Recognition worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Seconds the worker waits on an empty queue before stopping itself.
    pub poll_timeout_secs: u64,
    /// Frames fed to the engine per call.
    pub sub_chunk_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
            block_size: defaults::BLOCK_SIZE,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            backend: "vosk".to_string(),
            mode: defaults::MODE.to_string(),
            model_dir: PathBuf::from(defaults::MODEL_DIR),
            words: true,
            filler_tokens: defaults::FILLER_TOKENS
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: defaults::QUEUE_POLL_TIMEOUT.as_secs(),
            sub_chunk_frames: defaults::SUB_CHUNK_FRAMES,
        }
    }
}

impl RecognitionConfig {
    /// Full path of the model for the configured mode.
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.mode)
    }

    /// True if `text` is empty or one of the configured filler tokens,
    /// i.e. the engine resolved no actual speech.
    pub fn is_no_speech(&self, text: &str) -> bool {
        text.is_empty() || self.filler_tokens.iter().any(|t| t == text)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields fall back to defaults; invalid TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, or defaults if the file is missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(EarshotError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported:
    /// - EARSHOT_MODE → recognition.mode
    /// - EARSHOT_MODEL_DIR → recognition.model_dir
    /// - EARSHOT_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(mode) = std::env::var("EARSHOT_MODE")
            && !mode.is_empty()
        {
            self.recognition.mode = mode;
        }

        if let Ok(dir) = std::env::var("EARSHOT_MODEL_DIR")
            && !dir.is_empty()
        {
            self.recognition.model_dir = PathBuf::from(dir);
        }

        if let Ok(device) = std::env::var("EARSHOT_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(EarshotError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.audio.channels != 1 {
            return Err(EarshotError::ConfigInvalidValue {
                key: "audio.channels".to_string(),
                message: "recognition input must be mono".to_string(),
            });
        }
        if self.audio.block_size == 0 {
            return Err(EarshotError::ConfigInvalidValue {
                key: "audio.block_size".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.worker.sub_chunk_frames == 0 {
            return Err(EarshotError::ConfigInvalidValue {
                key: "worker.sub_chunk_frames".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.audio.block_size, 80_000);
        assert_eq!(config.worker.poll_timeout_secs, 10);
        assert_eq!(config.worker.sub_chunk_frames, 4000);
    }

    #[test]
    fn model_path_joins_dir_and_mode() {
        let config = Config::default();
        assert_eq!(
            config.recognition.model_path(),
            PathBuf::from("data/models/production")
        );
    }

    #[test]
    fn is_no_speech_matches_empty_and_fillers() {
        let recognition = RecognitionConfig::default();
        assert!(recognition.is_no_speech(""));
        assert!(recognition.is_no_speech("the"));
        assert!(!recognition.is_no_speech("hello world"));
        assert!(!recognition.is_no_speech("the cat"));
    }

    #[test]
    fn load_parses_partial_toml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[recognition]\nmode = \"dev\"\n\n[worker]\npoll_timeout_secs = 3"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.recognition.mode, "dev");
        assert_eq!(config.worker.poll_timeout_secs, 3);
        // Untouched sections keep defaults
        assert_eq!(config.audio.sample_rate, 16000);
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml [[[").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[audio]\nsample_rate = 0").unwrap();
        match Config::load(file.path()) {
            Err(EarshotError::ConfigInvalidValue { key, .. }) => {
                assert_eq!(key, "audio.sample_rate");
            }
            other => panic!("expected ConfigInvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn load_or_default_returns_defaults_for_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/earshot.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn env_overrides_apply_and_ignore_empty_values() {
        // Env access is process-global; this test is the only one touching
        // the EARSHOT_* names, and restores them before returning.
        unsafe {
            std::env::set_var("EARSHOT_MODE", "dev");
            std::env::set_var("EARSHOT_MODEL_DIR", "/tmp/models");
            std::env::set_var("EARSHOT_AUDIO_DEVICE", "pipewire");
        }
        let config = Config::default().with_env_overrides();
        assert_eq!(config.recognition.mode, "dev");
        assert_eq!(config.recognition.model_dir, PathBuf::from("/tmp/models"));
        assert_eq!(config.audio.device.as_deref(), Some("pipewire"));

        unsafe {
            std::env::set_var("EARSHOT_MODE", "");
            std::env::remove_var("EARSHOT_MODEL_DIR");
            std::env::remove_var("EARSHOT_AUDIO_DEVICE");
        }
        let config = Config::default().with_env_overrides();
        // Empty and unset variables leave the defaults untouched.
        assert_eq!(config.recognition.mode, defaults::MODE);
        assert_eq!(
            config.recognition.model_dir,
            PathBuf::from(defaults::MODEL_DIR)
        );
        assert_eq!(config.audio.device, None);

        unsafe {
            std::env::remove_var("EARSHOT_MODE");
        }
    }

    #[test]
    fn validate_rejects_stereo() {
        let mut config = Config::default();
        config.audio.channels = 2;
        assert!(config.validate().is_err());
    }
}
