//! Elapsed-time measurement for the pipeline.
//!
//! Two shapes of the same concern: [`Stopwatch`] for explicit start/stop
//! measurement, [`ScopedTimer`] for scoped acquisition that records on exit
//! regardless of how the scope is left. [`LatencyTracker`] aggregates
//! per-chunk capture-to-completion latencies.

use std::time::{Duration, Instant};
use tracing::debug;

/// Explicit start/stop timer.
///
/// Misuse (stopping a timer that was never started, starting one twice)
/// is reported rather than silently measuring nonsense.
#[derive(Debug, Default)]
pub struct Stopwatch {
    started: Option<Instant>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start measuring. Errors if already running.
    pub fn start(&mut self) -> Result<(), TimingError> {
        if self.started.is_some() {
            return Err(TimingError::AlreadyRunning);
        }
        self.started = Some(Instant::now());
        Ok(())
    }

    /// Stop measuring and return the elapsed duration.
    pub fn stop(&mut self) -> Result<Duration, TimingError> {
        match self.started.take() {
            Some(started) => Ok(started.elapsed()),
            None => Err(TimingError::NotRunning),
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TimingError {
    #[error("timer is already running")]
    AlreadyRunning,
    #[error("timer is not running")]
    NotRunning,
}

/// Logs the elapsed time for a labeled scope when dropped.
///
/// Drop runs on every exit path, so the measurement is recorded whether the
/// scope completes, early-returns or unwinds.
pub struct ScopedTimer {
    label: &'static str,
    started: Instant,
}

impl ScopedTimer {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
        }
    }

    /// Elapsed time so far, without ending the scope.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        debug!(
            target: "timer",
            "{}: elapsed time {:.4}s",
            self.label,
            self.started.elapsed().as_secs_f64()
        );
    }
}

/// Aggregated chunk-latency statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyStats {
    pub count: usize,
    pub avg: Duration,
    pub min: Duration,
    pub max: Duration,
}

/// Collects capture-to-completion latencies for processed chunks.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    measurements: Vec<Duration>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, latency: Duration) {
        self.measurements.push(latency);
    }

    /// Aggregate statistics, or `None` if nothing was recorded.
    pub fn stats(&self) -> Option<LatencyStats> {
        if self.measurements.is_empty() {
            return None;
        }

        let total: Duration = self.measurements.iter().sum();
        let min = self.measurements.iter().min().copied().unwrap_or_default();
        let max = self.measurements.iter().max().copied().unwrap_or_default();

        Some(LatencyStats {
            count: self.measurements.len(),
            avg: total / self.measurements.len() as u32,
            min,
            max,
        })
    }
}
