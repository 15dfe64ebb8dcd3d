//! voxdial Audio Core Library
//!
//! Telephony audio handling for the voxdial stack. Everything here is plain
//! CPU work with no suspension points; the async layers above call into it
//! from their own tasks.
//!
//! # Architecture
//!
//! - **Codec**: ITU-T G.711 µ-law and A-law companding
//! - **Resample**: band-limited polyphase sample-rate conversion
//! - **Convert**: S16↔F32 sample conversion and PCM frame validation
//! - **Recording**: append-only per-call PCM capture rendered to RIFF/WAV
//!
//! # Quick Start
//!
//! ```rust
//! use voxdial_audio_core::codec::{mulaw_decode, mulaw_encode};
//! use voxdial_audio_core::resample::Resampler;
//!
//! # fn example() -> Result<(), voxdial_audio_core::AudioError> {
//! // Decode one 20 ms G.711 frame and bring it up to 16 kHz for STT
//! let payload = vec![0xFFu8; 160];
//! let pcm8k = mulaw_decode(&payload);
//! let mut resampler = Resampler::new(8_000, 16_000)?;
//! let pcm16k = resampler.process(&pcm8k);
//! assert!(pcm16k.len() >= 318);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod convert;
pub mod error;
pub mod recording;
pub mod resample;

pub use convert::{f32_to_s16, s16_to_f32, validate_pcm16_frame};
pub use error::{AudioError, AudioResult};
pub use recording::RecordingBuffer;
pub use resample::{resample, Resampler, SUPPORTED_RATES};
