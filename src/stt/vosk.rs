//! Vosk-backed recognition engine.
//!
//! Wraps a Kaldi recognizer session over a pretrained model directory.
//! Requires the native libvosk library at build and run time.

use crate::error::{EarshotError, Result};
use crate::stt::engine::{Hypothesis, RecognitionEngine};
use std::path::Path;
use tracing::debug;
use vosk::{CompleteResult, DecodingState, Model, Recognizer};

/// Incremental recognizer backed by Vosk/Kaldi.
pub struct VoskEngine {
    recognizer: Recognizer,
}

impl VoskEngine {
    /// Load the model at `model_path` and open a recognizer session bound
    /// to `sample_rate`.
    ///
    /// # Errors
    /// `ModelNotFound` if the directory does not exist (the message tells
    /// the user where to download one); `BackendUnavailable` if libvosk
    /// rejects the model or the recognizer configuration.
    pub fn load(model_path: &Path, sample_rate: u32) -> Result<Self> {
        if !model_path.is_dir() {
            return Err(EarshotError::ModelNotFound {
                path: model_path.display().to_string(),
            });
        }

        let path_str = model_path.to_string_lossy().to_string();
        let model = Model::new(&path_str).ok_or_else(|| EarshotError::BackendUnavailable {
            message: format!("libvosk failed to load the model at {}", path_str),
        })?;

        let recognizer = Recognizer::new(&model, sample_rate as f32).ok_or_else(|| {
            EarshotError::BackendUnavailable {
                message: format!("failed to create recognizer at {} Hz", sample_rate),
            }
        })?;

        debug!(target: "engine", "Vosk model loaded from {}", path_str);
        Ok(Self { recognizer })
    }

    fn single_text(result: CompleteResult<'_>) -> String {
        result
            .single()
            .map(|r| r.text.to_string())
            .unwrap_or_default()
    }
}

impl RecognitionEngine for VoskEngine {
    fn accept_waveform(&mut self, samples: &[i16]) -> Result<bool> {
        match self.recognizer.accept_waveform(samples) {
            Ok(DecodingState::Finalized) => Ok(true),
            Ok(DecodingState::Running) => Ok(false),
            Ok(DecodingState::Failed) | Err(_) => Err(EarshotError::Decode {
                message: "vosk rejected the waveform".to_string(),
            }),
        }
    }

    fn final_result(&mut self) -> Result<Hypothesis> {
        Ok(Hypothesis::new(Self::single_text(self.recognizer.result())))
    }

    fn partial_result(&mut self) -> Result<Hypothesis> {
        Ok(Hypothesis::new(
            self.recognizer.partial_result().partial.to_string(),
        ))
    }

    fn set_words(&mut self, enabled: bool) {
        self.recognizer.set_words(enabled);
    }

    fn name(&self) -> &'static str {
        "vosk"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_reports_missing_model_directory() {
        let missing = Path::new("/nonexistent/earshot-model");
        match VoskEngine::load(missing, 16000) {
            Err(EarshotError::ModelNotFound { path }) => {
                assert!(path.contains("earshot-model"));
            }
            other => panic!("expected ModelNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn load_rejects_directory_without_model_files() {
        // An empty directory exists but is not a valid model.
        let dir = tempfile::tempdir().unwrap();
        match VoskEngine::load(dir.path(), 16000) {
            Err(EarshotError::BackendUnavailable { .. }) => {}
            Err(EarshotError::ModelNotFound { .. }) => {}
            other => panic!("expected a load failure, got {:?}", other.map(|_| ())),
        }
    }
}
