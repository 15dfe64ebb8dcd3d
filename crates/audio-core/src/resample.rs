//! Band-limited sample-rate conversion
//!
//! Telephony bridging constantly moves audio between 8 kHz (G.711), 16 kHz
//! (STT input) and the rates TTS providers emit. Conversion here is a
//! polyphase windowed-sinc FIR: the input is virtually upsampled by L,
//! low-pass filtered below the narrower Nyquist, and decimated by M, with
//! only the needed output taps ever computed. Nearest-neighbour or plain
//! linear interpolation is not acceptable on this path; the aliasing it
//! introduces measurably hurts transcription accuracy.

use crate::error::{AudioError, AudioResult};

/// Sample rates the converter accepts, in Hz
pub const SUPPORTED_RATES: &[u32] = &[8_000, 16_000, 22_050, 24_000, 44_100];

/// Sinc half-width in zero crossings; controls filter sharpness
const SINC_ZERO_CROSSINGS: usize = 16;

/// Streaming polyphase resampler for S16 mono audio.
///
/// State (filter history and output position) carries across `process`
/// calls, so feeding one long buffer or many 20 ms chunks produces the
/// same stream.
pub struct Resampler {
    from_rate: u32,
    to_rate: u32,
    /// Interpolation factor L
    interp: u64,
    /// Decimation factor M
    decim: u64,
    /// Flat FIR taps, length `taps_per_phase * interp`, per-phase normalised
    filter: Vec<f32>,
    taps_per_phase: usize,
    /// Last `taps_per_phase - 1` input samples from previous calls
    history: Vec<i16>,
    /// Total input samples consumed so far
    consumed: u64,
    /// Next output position in upsampled-stream units
    next_pos: u64,
}

impl Resampler {
    /// Create a converter between two supported rates.
    pub fn new(from_rate: u32, to_rate: u32) -> AudioResult<Self> {
        for rate in [from_rate, to_rate] {
            if !SUPPORTED_RATES.contains(&rate) {
                return Err(AudioError::UnsupportedSampleRate {
                    rate,
                    supported: SUPPORTED_RATES,
                });
            }
        }

        let g = gcd(from_rate as u64, to_rate as u64);
        let interp = to_rate as u64 / g;
        let decim = from_rate as u64 / g;

        let (filter, taps_per_phase) = if from_rate == to_rate {
            (Vec::new(), 1)
        } else {
            design_filter(interp, decim)
        };

        Ok(Self {
            from_rate,
            to_rate,
            interp,
            decim,
            filter,
            taps_per_phase,
            history: Vec::new(),
            consumed: 0,
            next_pos: 0,
        })
    }

    /// Source rate in Hz
    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    /// Target rate in Hz
    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    /// Convert a chunk of samples, returning whatever output is computable
    /// so far. Empty input yields empty output.
    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        if self.from_rate == self.to_rate {
            return input.to_vec();
        }
        if input.is_empty() {
            return Vec::new();
        }

        let taps = self.taps_per_phase;
        // Work buffer = history + new input; buf[0] sits at this absolute
        // input index.
        let start_abs = self.consumed - self.history.len() as u64;
        let mut buf = Vec::with_capacity(self.history.len() + input.len());
        buf.extend_from_slice(&self.history);
        buf.extend_from_slice(input);
        let total_abs = self.consumed + input.len() as u64;

        let mut out = Vec::with_capacity((input.len() as u64 * self.interp / self.decim) as usize + 1);
        while self.next_pos / self.interp < total_abs {
            let base = (self.next_pos / self.interp) as i64;
            let phase = (self.next_pos % self.interp) as usize;

            let mut acc = 0.0f32;
            for k in 0..taps {
                let idx = base - k as i64;
                if idx < start_abs as i64 {
                    break;
                }
                let sample = buf[(idx - start_abs as i64) as usize] as f32;
                acc += self.filter[phase + k * self.interp as usize] * sample;
            }
            out.push(clamp_to_s16(acc));
            self.next_pos += self.decim;
        }

        self.consumed = total_abs;
        let keep = taps.saturating_sub(1).min(buf.len());
        self.history = buf[buf.len() - keep..].to_vec();
        out
    }

    /// Drain the filter tail after the final chunk.
    pub fn flush(&mut self) -> Vec<i16> {
        if self.from_rate == self.to_rate {
            return Vec::new();
        }
        let tail = vec![0i16; self.taps_per_phase.saturating_sub(1)];
        self.process(&tail)
    }

    /// Reset all streaming state, keeping the designed filter.
    pub fn reset(&mut self) {
        self.history.clear();
        self.consumed = 0;
        self.next_pos = 0;
    }
}

/// One-shot conversion of a whole buffer between two supported rates.
pub fn resample(input: &[i16], from_rate: u32, to_rate: u32) -> AudioResult<Vec<i16>> {
    let mut converter = Resampler::new(from_rate, to_rate)?;
    let mut out = converter.process(input);
    out.extend(converter.flush());
    Ok(out)
}

/// Windowed-sinc prototype filter, polyphase-normalised.
///
/// Cutoff sits at 90% of the narrower Nyquist so the transition band stays
/// clear of speech content. Each polyphase leg is normalised to unity DC
/// gain, which removes interpolation amplitude ripple exactly.
fn design_filter(interp: u64, decim: u64) -> (Vec<f32>, usize) {
    let l = interp as usize;
    let stretch = interp.max(decim) as usize;
    let cutoff = 0.9f64 / stretch as f64;

    let half_width = SINC_ZERO_CROSSINGS * stretch;
    let taps_per_phase = (2 * half_width).div_ceil(l) + 1;
    let total = taps_per_phase * l;
    let center = (total - 1) as f64 / 2.0;

    let mut taps = vec![0.0f32; total];
    for (n, tap) in taps.iter_mut().enumerate() {
        let x = n as f64 - center;
        let sinc = normalized_sinc(cutoff * x);
        // Blackman window
        let w = 0.42 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / (total - 1) as f64).cos()
            + 0.08 * (4.0 * std::f64::consts::PI * n as f64 / (total - 1) as f64).cos();
        *tap = (cutoff * sinc * w) as f32;
    }

    // Per-phase DC normalisation
    for phase in 0..l {
        let sum: f32 = (0..taps_per_phase).map(|k| taps[phase + k * l]).sum();
        if sum.abs() > f32::EPSILON {
            for k in 0..taps_per_phase {
                taps[phase + k * l] /= sum;
            }
        }
    }

    (taps, taps_per_phase)
}

fn normalized_sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

fn clamp_to_s16(value: f32) -> i16 {
    value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(rate: u32, freq: f64, seconds: f64) -> Vec<i16> {
        let n = (rate as f64 * seconds) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / rate as f64;
                ((2.0 * std::f64::consts::PI * freq * t).sin() * 12_000.0) as i16
            })
            .collect()
    }

    fn rms(samples: &[i16]) -> f64 {
        let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / samples.len() as f64).sqrt()
    }

    #[test]
    fn rejects_unsupported_rates() {
        assert!(Resampler::new(8_000, 11_025).is_err());
        assert!(Resampler::new(96_000, 16_000).is_err());
    }

    #[test]
    fn identity_rate_is_passthrough() {
        let input = vec![5i16, -5, 100, -100];
        let mut r = Resampler::new(16_000, 16_000).unwrap();
        assert_eq!(r.process(&input), input);
        assert!(r.flush().is_empty());
    }

    #[test]
    fn upsample_doubles_length() {
        let input = sine(8_000, 400.0, 0.1);
        let mut r = Resampler::new(8_000, 16_000).unwrap();
        let out = r.process(&input);
        assert_eq!(out.len(), input.len() * 2);
    }

    #[test]
    fn downsample_halves_length() {
        let input = sine(16_000, 400.0, 0.1);
        let mut r = Resampler::new(16_000, 8_000).unwrap();
        let out = r.process(&input);
        assert_eq!(out.len(), input.len() / 2);
    }

    #[test]
    fn tone_survives_round_trip_with_similar_energy() {
        // A 400 Hz tone is far below every Nyquist involved, so energy
        // should be nearly unchanged through 8k -> 16k -> 8k.
        let input = sine(8_000, 400.0, 0.5);
        let up = resample(&input, 8_000, 16_000).unwrap();
        let down = resample(&up, 16_000, 8_000).unwrap();

        let settled = &down[800..input.len().min(down.len()) - 800];
        let ratio = rms(settled) / rms(&input[800..input.len() - 800]);
        assert!(
            (0.9..=1.1).contains(&ratio),
            "energy ratio {} outside tolerance",
            ratio
        );
    }

    #[test]
    fn fractional_ratio_length() {
        // 22050 -> 16000 exercises a non-integer conversion ratio
        let input = sine(22_050, 400.0, 0.2);
        let out = resample(&input, 22_050, 16_000).unwrap();
        let expected = input.len() as f64 * 16_000.0 / 22_050.0;
        let delta = (out.len() as f64 - expected).abs();
        assert!(delta < 64.0, "length {} vs expected {}", out.len(), expected);
    }

    #[test]
    fn chunked_and_whole_processing_agree() {
        let input = sine(8_000, 300.0, 0.2);
        let whole = resample(&input, 8_000, 16_000).unwrap();

        let mut chunked = Resampler::new(8_000, 16_000).unwrap();
        let mut out = Vec::new();
        for chunk in input.chunks(160) {
            out.extend(chunked.process(chunk));
        }
        out.extend(chunked.flush());

        assert_eq!(whole.len(), out.len());
        for (a, b) in whole.iter().zip(out.iter()) {
            assert!((a - b).abs() <= 1);
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let mut r = Resampler::new(8_000, 16_000).unwrap();
        assert!(r.process(&[]).is_empty());
    }
}
