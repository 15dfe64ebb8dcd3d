//! Sample format conversion and PCM frame validation

use crate::error::{AudioError, AudioResult};

/// Minimum accepted frame duration for inbound audio
pub const MIN_FRAME_MS: u32 = 10;
/// Maximum accepted frame duration for inbound audio
pub const MAX_FRAME_MS: u32 = 1000;

/// Convert 32-bit float samples in [-1.0, 1.0] to 16-bit signed PCM.
///
/// Out-of-range inputs are clamped rather than wrapped.
pub fn f32_to_s16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let clamped = s.clamp(-1.0, 1.0);
            (clamped * 32767.0).round() as i16
        })
        .collect()
}

/// Convert 16-bit signed PCM to 32-bit float samples in [-1.0, 1.0].
pub fn s16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Reinterpret little-endian S16 bytes as samples.
///
/// Fails if the byte count does not divide into whole samples. An empty
/// input is valid and yields an empty output.
pub fn bytes_to_s16(bytes: &[u8]) -> AudioResult<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(AudioError::invalid_format(format!(
            "S16 frame of {} bytes is not a whole number of samples",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Render S16 samples to little-endian bytes.
pub fn s16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Validate an inbound S16 mono frame before it reaches STT.
///
/// Checks byte alignment and that the frame duration at `sample_rate`
/// falls within [`MIN_FRAME_MS`, `MAX_FRAME_MS`]. Empty frames pass; the
/// caller is expected to skip them.
pub fn validate_pcm16_frame(bytes: &[u8], sample_rate: u32) -> AudioResult<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    if bytes.len() % 2 != 0 {
        return Err(AudioError::invalid_format(format!(
            "frame of {} bytes is odd-length for S16 mono",
            bytes.len()
        )));
    }
    let samples = (bytes.len() / 2) as u64;
    let duration_ms = (samples * 1000 / sample_rate as u64) as u32;
    if !(MIN_FRAME_MS..=MAX_FRAME_MS).contains(&duration_ms) {
        return Err(AudioError::FrameDurationOutOfRange {
            duration_ms,
            min_ms: MIN_FRAME_MS,
            max_ms: MAX_FRAME_MS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_round_trip_preserves_sign_and_scale() {
        let samples = vec![0i16, 16384, -16384, 32767, -32768];
        let floats = s16_to_f32(&samples);
        let back = f32_to_s16(&floats);
        for (a, b) in samples.iter().zip(back.iter()) {
            assert!((a - b).abs() <= 1, "{} -> {}", a, b);
        }
    }

    #[test]
    fn f32_clamps_out_of_range() {
        let out = f32_to_s16(&[2.0, -2.0]);
        assert_eq!(out, vec![32767, -32767]);
    }

    #[test]
    fn odd_byte_count_is_rejected() {
        assert!(bytes_to_s16(&[0x01]).is_err());
        assert!(validate_pcm16_frame(&[0x01], 16_000).is_err());
    }

    #[test]
    fn empty_input_is_valid() {
        assert_eq!(bytes_to_s16(&[]).unwrap(), Vec::<i16>::new());
        assert!(validate_pcm16_frame(&[], 16_000).is_ok());
    }

    #[test]
    fn byte_round_trip() {
        let samples = vec![1i16, -2, 300, -30_000];
        assert_eq!(bytes_to_s16(&s16_to_bytes(&samples)).unwrap(), samples);
    }

    #[test]
    fn frame_duration_window() {
        // 20 ms at 16 kHz = 320 samples = 640 bytes: accepted
        assert!(validate_pcm16_frame(&vec![0u8; 640], 16_000).is_ok());
        // 5 ms: too short
        assert!(validate_pcm16_frame(&vec![0u8; 160], 16_000).is_err());
        // 1000 ms exactly: inclusive upper bound
        assert!(validate_pcm16_frame(&vec![0u8; 32_000], 16_000).is_ok());
        // over a second: rejected
        assert!(validate_pcm16_frame(&vec![0u8; 34_000], 16_000).is_err());
    }
}
