//! Audio chunk encoding and decoding.
//!
//! One capture block becomes one [`AudioChunk`]: the raw PCM samples wrapped
//! in a self-describing WAV container plus the capture timestamp. The worker
//! later decodes the container back into fixed-size sub-chunks for the
//! recognition engine.

use crate::error::{EarshotError, Result};
use std::io::Cursor;
use std::time::Instant;

/// One captured block of audio, queued between capture and recognition.
///
/// Immutable once created. Owned by the queue until dequeued, then by the
/// worker until processing finishes.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// WAV-encoded samples (format header + 16-bit PCM data).
    pub container: Vec<u8>,
    /// When the capture callback produced this block.
    pub captured_at: Instant,
}

impl AudioChunk {
    /// Age of this chunk, i.e. capture-to-now latency.
    pub fn age(&self) -> std::time::Duration {
        self.captured_at.elapsed()
    }
}

/// Wraps raw PCM blocks into [`AudioChunk`] containers.
///
/// Construction validates the audio format; encoding itself is pure and
/// cannot fail for well-formed sample slices.
#[derive(Debug, Clone)]
pub struct ChunkEncoder {
    spec: hound::WavSpec,
}

impl ChunkEncoder {
    /// Create an encoder for the given format.
    ///
    /// # Errors
    /// Rejects a zero sample rate, and any channel count other than mono —
    /// the recognition engine consumes mono PCM only.
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(EarshotError::ConfigInvalidValue {
                key: "sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if channels != 1 {
            return Err(EarshotError::ConfigInvalidValue {
                key: "channels".to_string(),
                message: format!("must be 1 (mono), got {}", channels),
            });
        }

        Ok(Self {
            spec: hound::WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            },
        })
    }

    /// Encode one capture block, timestamping it with the current instant.
    pub fn encode(&self, samples: &[i16]) -> Result<AudioChunk> {
        let mut cursor = Cursor::new(Vec::with_capacity(samples.len() * 2 + 44));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, self.spec).map_err(|e| {
                EarshotError::Other(format!("Failed to create WAV writer: {}", e))
            })?;
            let mut i16_writer = writer.get_i16_writer(samples.len() as u32);
            for &sample in samples {
                i16_writer.write_sample(sample);
            }
            i16_writer
                .flush()
                .map_err(|e| EarshotError::Other(format!("Failed to write samples: {}", e)))?;
            writer
                .finalize()
                .map_err(|e| EarshotError::Other(format!("Failed to finalize WAV: {}", e)))?;
        }

        Ok(AudioChunk {
            container: cursor.into_inner(),
            captured_at: Instant::now(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }
}

/// Streams a chunk's container back out as fixed-size sub-chunks.
pub struct SubChunkReader<'a> {
    reader: hound::WavReader<Cursor<&'a [u8]>>,
    frames_per_read: usize,
}

impl<'a> SubChunkReader<'a> {
    /// Open a chunk's container for sub-chunk reads.
    ///
    /// # Errors
    /// `EarshotError::Decode` if the container is not valid 16-bit PCM WAV.
    pub fn new(chunk: &'a AudioChunk, frames_per_read: usize) -> Result<Self> {
        let reader =
            hound::WavReader::new(Cursor::new(chunk.container.as_slice())).map_err(|e| {
                EarshotError::Decode {
                    message: format!("invalid WAV container: {}", e),
                }
            })?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(EarshotError::Decode {
                message: format!(
                    "unexpected sample format: {}-bit {:?}",
                    spec.bits_per_sample, spec.sample_format
                ),
            });
        }

        Ok(Self {
            reader,
            frames_per_read,
        })
    }

    /// Read the next sub-chunk, or `None` when the container is exhausted.
    ///
    /// The last sub-chunk may be shorter than `frames_per_read`.
    pub fn next_sub_chunk(&mut self) -> Result<Option<Vec<i16>>> {
        let mut frames = Vec::with_capacity(self.frames_per_read);
        for sample in self.reader.samples::<i16>().take(self.frames_per_read) {
            frames.push(sample.map_err(|e| EarshotError::Decode {
                message: format!("corrupt sample data: {}", e),
            })?);
        }

        if frames.is_empty() {
            Ok(None)
        } else {
            Ok(Some(frames))
        }
    }
}
