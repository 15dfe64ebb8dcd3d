//! Per-call recording capture
//!
//! Each live call owns one [`RecordingBuffer`]: an append-only run of
//! linear PCM at the gateway-native rate (16 kHz for WebSocket calls,
//! 8 kHz for RTP calls). On call end the buffer is rendered to a RIFF/WAV
//! container in memory and handed to the blob store.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::{AudioError, AudioResult};

/// Append-only PCM capture for one call.
#[derive(Debug, Clone)]
pub struct RecordingBuffer {
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
    data: Vec<u8>,
}

impl RecordingBuffer {
    /// Create an empty buffer at the given capture format.
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
            data: Vec::new(),
        }
    }

    /// 16-bit mono at the given rate, the format both gateways capture in.
    pub fn mono16(sample_rate: u32) -> Self {
        Self::new(sample_rate, 1, 16)
    }

    /// Capture rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Bytes per complete sample frame across all channels
    pub fn block_align(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Append raw little-endian PCM bytes.
    ///
    /// The chunk must contain whole sample frames; empty chunks are a no-op.
    pub fn append_bytes(&mut self, chunk: &[u8]) -> AudioResult<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        if chunk.len() % self.block_align() != 0 {
            return Err(AudioError::invalid_format(format!(
                "recording chunk of {} bytes is not a whole number of {}-byte frames",
                chunk.len(),
                self.block_align()
            )));
        }
        self.data.extend_from_slice(chunk);
        Ok(())
    }

    /// Append S16 samples (mono 16-bit buffers only).
    pub fn append_samples(&mut self, samples: &[i16]) -> AudioResult<()> {
        if self.bits_per_sample != 16 {
            return Err(AudioError::invalid_format(
                "sample append requires a 16-bit buffer",
            ));
        }
        self.append_bytes(&crate::convert::s16_to_bytes(samples))
    }

    /// Total captured bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether anything has been captured
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Captured duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.data.len() as f64 / (self.sample_rate as f64 * self.block_align() as f64)
    }

    /// Discard all captured audio, keeping the format.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Render the capture to an in-memory RIFF/WAV file.
    ///
    /// The header carries the buffer's own rate; recordings are stored at
    /// gateway-native rate without normalisation.
    pub fn to_wav_bytes(&self) -> AudioResult<Vec<u8>> {
        let spec = WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).map_err(|e| {
                AudioError::RenderFailed {
                    reason: e.to_string(),
                }
            })?;
            for pair in self.data.chunks_exact(2) {
                let sample = i16::from_le_bytes([pair[0], pair[1]]);
                writer
                    .write_sample(sample)
                    .map_err(|e| AudioError::RenderFailed {
                        reason: e.to_string(),
                    })?;
            }
            writer.finalize().map_err(|e| AudioError::RenderFailed {
                reason: e.to_string(),
            })?;
        }
        Ok(cursor.into_inner())
    }
}
