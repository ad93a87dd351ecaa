//! Lifecycle controller.
//!
//! Owns the whole pipeline: it loads the recognition engine, binds the
//! capture callback to the queue, and coordinates clean shutdown. The
//! capture callback does exactly three things per block: encode, enqueue,
//! and make sure a worker is alive to drain the queue.

use crate::audio::capture::{BlockHandler, CaptureSource};
use crate::audio::chunk::ChunkEncoder;
use crate::config::Config;
use crate::defaults;
use crate::error::{EarshotError, Result};
use crate::queue::StreamQueue;
use crate::sink::TranscriptSink;
use crate::stt::engine::{NullEngine, RecognitionEngine};
use crate::worker::{WorkerManager, WorkerSettings, WorkerState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Build the configured recognition engine.
///
/// Fatal when the backend's model resource is missing: no recognition is
/// possible without it, and the error message tells the user where to get
/// one.
pub fn load_engine(config: &Config) -> Result<Box<dyn RecognitionEngine>> {
    match config.recognition.backend.as_str() {
        "null" => {
            warn!(
                target: "controller",
                "Using the null recognition backend; audio will be consumed but never transcribed"
            );
            Ok(Box::new(NullEngine))
        }
        "vosk" => load_vosk_engine(config),
        other => Err(EarshotError::ConfigInvalidValue {
            key: "recognition.backend".to_string(),
            message: format!("unknown backend {:?} (expected \"vosk\" or \"null\")", other),
        }),
    }
}

#[cfg(feature = "vosk")]
fn load_vosk_engine(config: &Config) -> Result<Box<dyn RecognitionEngine>> {
    use crate::stt::vosk::VoskEngine;
    use crate::timing::Stopwatch;
    use tracing::debug;

    debug!(
        target: "controller",
        "Loading speech recognition model - mode: {}",
        config.recognition.mode
    );

    let mut stopwatch = Stopwatch::new();
    let _ = stopwatch.start();
    let mut engine = VoskEngine::load(
        &config.recognition.model_path(),
        config.audio.sample_rate,
    )?;
    engine.set_words(config.recognition.words);
    if let Ok(elapsed) = stopwatch.stop() {
        debug!(
            target: "controller",
            "Model loaded in {:.2}s",
            elapsed.as_secs_f64()
        );
    }

    Ok(Box::new(engine))
}

#[cfg(not(feature = "vosk"))]
fn load_vosk_engine(config: &Config) -> Result<Box<dyn RecognitionEngine>> {
    let _ = config;
    Err(EarshotError::BackendUnavailable {
        message: format!(
            "this build has no vosk support; rebuild with `--features vosk` \
             (models: {}) or set recognition.backend = \"null\"",
            defaults::MODEL_DOWNLOAD_URL
        ),
    })
}

/// Coordinates capture, queue and worker start/stop.
pub struct Controller {
    queue: StreamQueue,
    worker: Arc<WorkerManager>,
    capture: Box<dyn CaptureSource>,
    encoder: ChunkEncoder,
    block_size: usize,
    join_timeout: Duration,
    started: bool,
}

impl Controller {
    /// Wire up the pipeline. The engine should come from [`load_engine`];
    /// the sink receives every recognized utterance.
    pub fn new(
        config: &Config,
        capture: Box<dyn CaptureSource>,
        engine: Box<dyn RecognitionEngine>,
        sink: Box<dyn TranscriptSink>,
    ) -> Result<Self> {
        config.validate()?;
        let encoder = ChunkEncoder::new(config.audio.sample_rate, config.audio.channels)?;
        let queue = StreamQueue::new();
        let worker = Arc::new(WorkerManager::new(
            queue.clone(),
            engine,
            sink,
            WorkerSettings::from_config(config),
        ));

        Ok(Self {
            queue,
            worker,
            capture,
            encoder,
            block_size: config.audio.block_size,
            join_timeout: defaults::SHUTDOWN_JOIN_TIMEOUT,
            started: false,
        })
    }

    /// Open the capture source with the enqueue callback.
    ///
    /// Returns once audio is flowing; the caller decides when to [`stop`].
    ///
    /// [`stop`]: Controller::stop
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        let encoder = self.encoder.clone();
        let queue = self.queue.clone();
        let worker = Arc::clone(&self.worker);
        let handler: BlockHandler = Box::new(move |block: &[i16]| {
            match encoder.encode(block) {
                Ok(chunk) => {
                    queue.push(chunk);
                    worker.ensure_running();
                }
                Err(e) => {
                    warn!(target: "capture", "Failed to encode capture block: {}", e);
                }
            }
        });

        self.capture.open(self.block_size, handler)?;
        self.started = true;
        info!(target: "controller", "Capture connected. Now streaming audio data...");
        Ok(())
    }

    /// Close capture, let the worker finish its in-flight chunk, and join
    /// it with a bounded wait.
    pub fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }

        info!(target: "controller", "Shutting down...");
        self.capture.close()?;

        if !self.worker.stop(self.join_timeout) {
            error!(
                target: "controller",
                "Forced shutdown: worker abandoned after {:?}",
                self.join_timeout
            );
        }
        self.started = false;

        if let Some(stats) = self.worker.latency_stats() {
            info!(
                target: "controller",
                "Processed {} chunk(s); latency avg {:.3}s, min {:.3}s, max {:.3}s",
                stats.count,
                stats.avg.as_secs_f64(),
                stats.min.as_secs_f64(),
                stats.max.as_secs_f64(),
            );
        }
        Ok(())
    }

    /// Close capture, process everything already enqueued, then stop.
    ///
    /// For finite sources (piped WAV data): closing the source first means
    /// every remaining block lands in the queue before we start waiting for
    /// it to empty.
    pub fn drain(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }

        self.capture.close()?;

        // Keep the worker alive for the whole drain (it may die mid-way,
        // e.g. on a panicking sink), and give up once the queue stops
        // shrinking for longer than the join timeout.
        let mut last_len = self.queue.len();
        let mut last_progress = Instant::now();
        while !self.queue.is_empty() {
            self.worker.ensure_running();
            std::thread::sleep(Duration::from_millis(10));

            let len = self.queue.len();
            if len < last_len {
                last_len = len;
                last_progress = Instant::now();
            } else if last_progress.elapsed() > self.join_timeout {
                warn!(
                    target: "controller",
                    "Drain stalled with {} chunk(s) pending; giving up",
                    len
                );
                break;
            }
        }
        // The worker finishes its in-flight chunk before honoring stop.
        self.stop()
    }

    /// Chunks enqueued but not yet drained by the worker.
    pub fn pending_chunks(&self) -> usize {
        self.queue.len()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker.state()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}
