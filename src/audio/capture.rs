//! Audio capture sources.
//!
//! Capture is a push boundary: a source delivers fixed-size blocks of mono
//! 16-bit PCM to a registered handler on its own thread. The handler's only
//! job is to encode and enqueue; recognition stays on the consumer side.

use crate::error::Result;
use std::sync::{Arc, Mutex};

/// Callback invoked with each captured block of samples.
pub type BlockHandler = Box<dyn FnMut(&[i16]) + Send + 'static>;

/// Continuous audio input delivering fixed-size blocks to a handler.
pub trait CaptureSource: Send {
    /// Start capturing. The handler receives blocks of exactly `block_size`
    /// samples (the final block of a finite source may be shorter).
    fn open(&mut self, block_size: usize, handler: BlockHandler) -> Result<()>;

    /// Stop capturing. No handler invocations occur after this returns.
    fn close(&mut self) -> Result<()>;
}

/// Accumulates incoming samples and emits complete blocks to the handler.
///
/// Shared between capture threads and the owning source.
pub(crate) struct BlockAssembler {
    block_size: usize,
    pending: Vec<i16>,
    handler: BlockHandler,
}

impl BlockAssembler {
    pub(crate) fn new(block_size: usize, handler: BlockHandler) -> Self {
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
            handler,
        }
    }

    /// Feed captured samples; invokes the handler once per completed block.
    pub(crate) fn feed(&mut self, samples: &[i16]) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.block_size {
            let rest = self.pending.split_off(self.block_size);
            let block = std::mem::replace(&mut self.pending, rest);
            (self.handler)(&block);
        }
    }

    /// Emit whatever is left as a final short block.
    pub(crate) fn flush(&mut self) {
        if !self.pending.is_empty() {
            let block = std::mem::take(&mut self.pending);
            (self.handler)(&block);
        }
    }
}

/// Test/replay source driven manually by the caller.
///
/// `open` registers the handler; the test then feeds samples through
/// [`ScriptedCaptureSource::emit`] from whatever thread it likes.
#[derive(Clone, Default)]
pub struct ScriptedCaptureSource {
    assembler: Arc<Mutex<Option<BlockAssembler>>>,
}

impl ScriptedCaptureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver samples as if the audio subsystem produced them.
    ///
    /// No-op when the source is not open.
    pub fn emit(&self, samples: &[i16]) {
        if let Ok(mut guard) = self.assembler.lock()
            && let Some(assembler) = guard.as_mut()
        {
            assembler.feed(samples);
        }
    }

    /// Flush any partial block to the handler.
    pub fn flush(&self) {
        if let Ok(mut guard) = self.assembler.lock()
            && let Some(assembler) = guard.as_mut()
        {
            assembler.flush();
        }
    }
}

impl CaptureSource for ScriptedCaptureSource {
    fn open(&mut self, block_size: usize, handler: BlockHandler) -> Result<()> {
        if let Ok(mut guard) = self.assembler.lock() {
            *guard = Some(BlockAssembler::new(block_size, handler));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Ok(mut guard) = self.assembler.lock() {
            *guard = None;
        }
        Ok(())
    }
}

/// Replays a WAV stream (e.g. stdin) through the capture boundary.
///
/// The WAV is downmixed/resampled to the target format up front, then a
/// replay thread delivers it to the handler in blocks and finishes.
pub struct WavCaptureSource {
    samples: Option<Vec<i16>>,
    replay: Option<std::thread::JoinHandle<()>>,
}

impl WavCaptureSource {
    /// Parse a WAV stream, converting to mono at `target_rate`.
    pub fn from_reader(reader: Box<dyn std::io::Read + Send>, target_rate: u32) -> Result<Self> {
        let mut wav_reader =
            hound::WavReader::new(reader).map_err(|e| crate::error::EarshotError::AudioCapture {
                message: format!("Failed to parse WAV input: {}", e),
            })?;

        let spec = wav_reader.spec();
        let raw: Vec<i16> = wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| crate::error::EarshotError::AudioCapture {
                message: format!("Failed to read WAV samples: {}", e),
            })?;

        let mono = crate::audio::downmix_to_mono(&raw, spec.channels as usize);
        let samples = crate::audio::resample(&mono, spec.sample_rate, target_rate);

        Ok(Self {
            samples: Some(samples),
            replay: None,
        })
    }

    /// Read a complete WAV stream from stdin.
    pub fn from_stdin(target_rate: u32) -> Result<Self> {
        use std::io::Read;

        // StdinLock is not Send; buffer everything first.
        let mut buffer = Vec::new();
        std::io::stdin().lock().read_to_end(&mut buffer)?;
        Self::from_reader(Box::new(std::io::Cursor::new(buffer)), target_rate)
    }
}

impl CaptureSource for WavCaptureSource {
    fn open(&mut self, block_size: usize, handler: BlockHandler) -> Result<()> {
        let samples = self.samples.take().unwrap_or_default();
        self.replay = Some(std::thread::spawn(move || {
            let mut assembler = BlockAssembler::new(block_size, handler);
            assembler.feed(&samples);
            assembler.flush();
        }));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.replay.take()
            && handle.join().is_err()
        {
            return Err(crate::error::EarshotError::AudioCapture {
                message: "WAV replay thread panicked".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(feature = "cpal-audio")]
pub use cpal_source::{CpalCaptureSource, list_devices, suppress_audio_warnings};

#[cfg(feature = "cpal-audio")]
mod cpal_source {
    use super::{BlockAssembler, BlockHandler, CaptureSource};
    use crate::error::{EarshotError, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::{Arc, Mutex};
    use tracing::warn;

    /// Run a closure with stderr temporarily redirected to /dev/null.
    ///
    /// Suppresses noisy ALSA/JACK/PipeWire messages that cpal triggers when
    /// probing audio backends.
    ///
    /// # Safety
    /// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2.
    /// Safe as long as no other thread is concurrently manipulating fd 2.
    fn with_suppressed_stderr<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        unsafe {
            let saved_fd = libc::dup(2);
            let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
            if saved_fd >= 0 && devnull >= 0 {
                libc::dup2(devnull, 2);
                libc::close(devnull);
            }

            let result = f();

            if saved_fd >= 0 {
                libc::dup2(saved_fd, 2);
                libc::close(saved_fd);
            }

            result
        }
    }

    /// Quiet the JACK/ALSA/PipeWire probing chatter.
    ///
    /// # Safety
    /// Modifies environment variables; call at startup before spawning threads.
    pub fn suppress_audio_warnings() {
        // SAFETY: called at startup before any threads are spawned
        unsafe {
            std::env::set_var("JACK_NO_START_SERVER", "1");
            std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
            std::env::set_var("PIPEWIRE_DEBUG", "0");
            std::env::set_var("ALSA_DEBUG", "0");
            std::env::set_var("PW_LOG", "0");
        }
    }

    /// Preferred device names for GNOME/PipeWire environments.
    const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

    /// Device name patterns that are never useful for voice input.
    const FILTERED_PATTERNS: &[&str] = &[
        "surround",
        "front:",
        "rear:",
        "center:",
        "side:",
        "Digital Output",
        "HDMI",
        "S/PDIF",
    ];

    fn should_filter_device(name: &str) -> bool {
        let lower = name.to_lowercase();
        FILTERED_PATTERNS
            .iter()
            .any(|pattern| lower.contains(&pattern.to_lowercase()))
    }

    fn is_preferred_device(name: &str) -> bool {
        let lower = name.to_lowercase();
        PREFERRED_DEVICES
            .iter()
            .any(|pref| lower.contains(&pref.to_lowercase()))
    }

    /// List available input devices, filtered and with preferred devices
    /// marked "\[recommended\]".
    pub fn list_devices() -> Result<Vec<String>> {
        let (host, devices) = with_suppressed_stderr(|| {
            let host = cpal::default_host();
            let devices = host.input_devices();
            (host, devices)
        });
        let _ = host; // keep host alive while iterating devices
        let devices = devices.map_err(|e| EarshotError::AudioCapture {
            message: format!("Failed to enumerate input devices: {}", e),
        })?;

        let mut device_names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                if should_filter_device(&name) {
                    continue;
                }
                if is_preferred_device(&name) {
                    device_names.push(format!("{} [recommended]", name));
                } else {
                    device_names.push(name);
                }
            }
        }

        Ok(device_names)
    }

    /// Best default input device, preferring PipeWire/PulseAudio so the
    /// desktop's device selection is respected.
    fn get_best_default_device() -> Result<cpal::Device> {
        with_suppressed_stderr(|| {
            let host = cpal::default_host();

            if let Ok(devices) = host.input_devices() {
                for device in devices {
                    if let Ok(name) = device.name()
                        && is_preferred_device(&name)
                    {
                        return Ok(device);
                    }
                }
            }

            host.default_input_device()
                .ok_or_else(|| EarshotError::AudioDeviceNotFound {
                    device: "default".to_string(),
                })
        })
    }

    /// Wrapper for cpal::Stream to make it Send.
    ///
    /// SAFETY: the stream is only touched through the Mutex in
    /// CpalCaptureSource, one thread at a time.
    struct SendableStream(cpal::Stream);

    unsafe impl Send for SendableStream {}

    /// Microphone capture via cpal.
    ///
    /// Captures 16-bit PCM at the configured rate, mono. Tries i16 at the
    /// preferred config, then f32, then the device's native config with
    /// software downmix/resample. Delivers fixed-size blocks to the
    /// registered handler from the audio thread.
    pub struct CpalCaptureSource {
        device: cpal::Device,
        sample_rate: u32,
        stream: Arc<Mutex<Option<SendableStream>>>,
        assembler: Arc<Mutex<Option<BlockAssembler>>>,
        callback_count: Arc<std::sync::atomic::AtomicU64>,
    }

    impl CpalCaptureSource {
        /// Create a capture source for the named device, or the best
        /// default when `device_name` is `None`.
        pub fn new(device_name: Option<&str>, sample_rate: u32) -> Result<Self> {
            let device = with_suppressed_stderr(|| {
                let host = cpal::default_host();

                if let Some(name) = device_name {
                    let devices =
                        host.input_devices()
                            .map_err(|e| EarshotError::AudioCapture {
                                message: format!("Failed to enumerate devices: {}", e),
                            })?;

                    let mut found_device = None;
                    for dev in devices {
                        if let Ok(dev_name) = dev.name()
                            && dev_name == name
                        {
                            found_device = Some(dev);
                            break;
                        }
                    }

                    found_device.ok_or_else(|| EarshotError::AudioDeviceNotFound {
                        device: name.to_string(),
                    })
                } else {
                    get_best_default_device()
                }
            })?;

            Ok(Self {
                device,
                sample_rate,
                stream: Arc::new(Mutex::new(None)),
                assembler: Arc::new(Mutex::new(None)),
                callback_count: Arc::new(std::sync::atomic::AtomicU64::new(0)),
            })
        }

        fn deliver(assembler: &Arc<Mutex<Option<BlockAssembler>>>, samples: &[i16]) {
            if let Ok(mut guard) = assembler.lock()
                && let Some(assembler) = guard.as_mut()
            {
                assembler.feed(samples);
            }
        }

        /// Build the stream, trying i16 then f32 at the preferred config.
        ///
        /// Falls through to the native-config path for PipeWire-ALSA setups
        /// that accept non-native configs but never fire the data callback.
        fn build_stream(&self) -> Result<cpal::Stream> {
            use std::sync::atomic::Ordering;

            let preferred_config = cpal::StreamConfig {
                channels: 1,
                sample_rate: cpal::SampleRate(self.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let err_callback = |err| {
                warn!(target: "capture", "Audio stream error: {}", err);
            };

            // i16 mono at the target rate — PipeWire/PulseAudio convert transparently
            let assembler = Arc::clone(&self.assembler);
            let counter = Arc::clone(&self.callback_count);
            if let Ok(stream) = self.device.build_input_stream(
                &preferred_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Self::deliver(&assembler, data);
                },
                err_callback,
                None,
            ) {
                return Ok(stream);
            }

            // f32 for devices that only expose float formats
            let assembler = Arc::clone(&self.assembler);
            let counter = Arc::clone(&self.callback_count);
            if let Ok(stream) = self.device.build_input_stream(
                &preferred_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    let converted: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    Self::deliver(&assembler, &converted);
                },
                err_callback,
                None,
            ) {
                return Ok(stream);
            }

            self.build_stream_native()
        }

        /// Capture at the device's native config, converting in software.
        fn build_stream_native(&self) -> Result<cpal::Stream> {
            use cpal::SampleFormat;
            use std::sync::atomic::Ordering;

            let default_config =
                self.device
                    .default_input_config()
                    .map_err(|e| EarshotError::AudioCapture {
                        message: format!("Failed to query default input config: {}", e),
                    })?;

            let native_rate = default_config.sample_rate().0;
            let native_channels = default_config.channels() as usize;
            let target_rate = self.sample_rate;

            let stream_config: cpal::StreamConfig = default_config.clone().into();

            warn!(
                target: "capture",
                "Using native audio format ({}ch/{}Hz/{:?}), converting in software",
                native_channels,
                native_rate,
                default_config.sample_format(),
            );

            let err_callback = |err| {
                warn!(target: "capture", "Audio stream error: {}", err);
            };

            let assembler = Arc::clone(&self.assembler);
            let counter = Arc::clone(&self.callback_count);

            match default_config.sample_format() {
                SampleFormat::I16 => self
                    .device
                    .build_input_stream(
                        &stream_config,
                        move |data: &[i16], _: &cpal::InputCallbackInfo| {
                            counter.fetch_add(1, Ordering::Relaxed);
                            let mono = crate::audio::downmix_to_mono(data, native_channels);
                            let converted =
                                crate::audio::resample(&mono, native_rate, target_rate);
                            Self::deliver(&assembler, &converted);
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| EarshotError::AudioCapture {
                        message: format!("Failed to build native i16 stream: {}", e),
                    }),
                SampleFormat::F32 => self
                    .device
                    .build_input_stream(
                        &stream_config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            counter.fetch_add(1, Ordering::Relaxed);
                            let i16_data: Vec<i16> = data
                                .iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                                .collect();
                            let mono =
                                crate::audio::downmix_to_mono(&i16_data, native_channels);
                            let converted =
                                crate::audio::resample(&mono, native_rate, target_rate);
                            Self::deliver(&assembler, &converted);
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| EarshotError::AudioCapture {
                        message: format!("Failed to build native f32 stream: {}", e),
                    }),
                fmt => Err(EarshotError::AudioCapture {
                    message: format!(
                        "Unsupported native sample format: {:?}. \
                         Try specifying a device with --device.",
                        fmt
                    ),
                }),
            }
        }
    }

    impl CaptureSource for CpalCaptureSource {
        fn open(&mut self, block_size: usize, handler: BlockHandler) -> Result<()> {
            use std::sync::atomic::Ordering;

            {
                let stream_guard =
                    self.stream.lock().map_err(|e| EarshotError::AudioCapture {
                        message: format!("Failed to lock stream: {}", e),
                    })?;
                if stream_guard.is_some() {
                    return Ok(()); // already open
                }
            }

            if let Ok(mut guard) = self.assembler.lock() {
                *guard = Some(BlockAssembler::new(block_size, handler));
            }

            let stream = self.build_stream()?;
            stream.play().map_err(|e| EarshotError::AudioCapture {
                message: format!("Failed to start audio stream: {}", e),
            })?;

            // Some PipeWire-ALSA setups accept a non-native config but never
            // deliver data; verify the callback actually fires.
            std::thread::sleep(std::time::Duration::from_millis(200));

            let final_stream = if self.callback_count.load(Ordering::Relaxed) == 0 {
                drop(stream);
                let native_stream = self.build_stream_native()?;
                native_stream
                    .play()
                    .map_err(|e| EarshotError::AudioCapture {
                        message: format!("Failed to start native audio stream: {}", e),
                    })?;
                native_stream
            } else {
                stream
            };

            let mut stream_guard =
                self.stream.lock().map_err(|e| EarshotError::AudioCapture {
                    message: format!("Failed to lock stream: {}", e),
                })?;
            *stream_guard = Some(SendableStream(final_stream));
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            let mut stream_guard =
                self.stream.lock().map_err(|e| EarshotError::AudioCapture {
                    message: format!("Failed to lock stream: {}", e),
                })?;

            if let Some(sendable_stream) = stream_guard.take() {
                sendable_stream
                    .0
                    .pause()
                    .map_err(|e| EarshotError::AudioCapture {
                        message: format!("Failed to stop audio stream: {}", e),
                    })?;
            }

            if let Ok(mut guard) = self.assembler.lock() {
                *guard = None;
            }
            Ok(())
        }
    }

}
