//! Error types for audio processing

use thiserror::Error;

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

/// Errors produced by the audio layer
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    /// Input bytes do not form whole samples for the declared format
    #[error("invalid audio format: {reason}")]
    InvalidFormat {
        /// Why the input was rejected
        reason: String,
    },

    /// A sample rate outside the supported telephony set
    #[error("unsupported sample rate {rate} Hz (supported: {supported:?})")]
    UnsupportedSampleRate {
        /// The offending rate
        rate: u32,
        /// Rates this build supports
        supported: &'static [u32],
    },

    /// A frame whose duration falls outside the accepted window
    #[error("frame duration {duration_ms} ms outside accepted range [{min_ms}, {max_ms}] ms")]
    FrameDurationOutOfRange {
        /// Duration of the rejected frame
        duration_ms: u32,
        /// Minimum accepted duration
        min_ms: u32,
        /// Maximum accepted duration
        max_ms: u32,
    },

    /// WAV rendering failed
    #[error("recording render failed: {reason}")]
    RenderFailed {
        /// Underlying failure description
        reason: String,
    },
}

impl AudioError {
    /// Convenience constructor for format errors
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        AudioError::InvalidFormat {
            reason: reason.into(),
        }
    }
}
