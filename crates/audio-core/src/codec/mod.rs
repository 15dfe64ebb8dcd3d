//! G.711 Audio Codec
//!
//! ITU-T G.711 companding in both µ-law (PCMU) and A-law (PCMA) variants,
//! the standard codecs for narrowband telephony. Both operate on 16-bit
//! linear PCM at 8 kHz and produce one byte per sample.
//!
//! Round trips are lossy but bounded: `decode(encode(x))` lands within one
//! quantisation step of `x` for the segment `x` falls in, and re-encoding a
//! decoded value reproduces the same byte.
//!
//! ```rust
//! use voxdial_audio_core::codec::{mulaw_decode, mulaw_encode};
//!
//! let samples = vec![0i16, 1000, -1000, 32000];
//! let encoded = mulaw_encode(&samples);
//! let decoded = mulaw_decode(&encoded);
//! assert_eq!(mulaw_encode(&decoded), encoded);
//! ```

mod g711;

pub use g711::{
    alaw_compress, alaw_expand, mulaw_compress, mulaw_expand, G711Variant,
};

/// Encode linear PCM samples to µ-law bytes
pub fn mulaw_encode(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| mulaw_compress(s)).collect()
}

/// Decode µ-law bytes to linear PCM samples
pub fn mulaw_decode(encoded: &[u8]) -> Vec<i16> {
    encoded.iter().map(|&b| mulaw_expand(b)).collect()
}

/// Encode linear PCM samples to A-law bytes
pub fn alaw_encode(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| alaw_compress(s)).collect()
}

/// Decode A-law bytes to linear PCM samples
pub fn alaw_decode(encoded: &[u8]) -> Vec<i16> {
    encoded.iter().map(|&b| alaw_expand(b)).collect()
}

/// Encode with the given variant
pub fn encode(variant: G711Variant, samples: &[i16]) -> Vec<u8> {
    match variant {
        G711Variant::MuLaw => mulaw_encode(samples),
        G711Variant::ALaw => alaw_encode(samples),
    }
}

/// Decode with the given variant
pub fn decode(variant: G711Variant, encoded: &[u8]) -> Vec<i16> {
    match variant {
        G711Variant::MuLaw => mulaw_decode(encoded),
        G711Variant::ALaw => alaw_decode(encoded),
    }
}
