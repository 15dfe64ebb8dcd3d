//! Property tests for the G.711 companding laws

use proptest::prelude::*;
use voxdial_audio_core::codec::{
    alaw_compress, alaw_expand, mulaw_compress, mulaw_expand,
};

proptest! {
    #[test]
    fn mulaw_round_trip_is_bounded(sample in i16::MIN..=i16::MAX) {
        let decoded = mulaw_expand(mulaw_compress(sample)) as i32;
        // The widest µ-law segment quantises in steps of 1024
        prop_assert!((decoded - sample as i32).abs() <= 1024);
    }

    #[test]
    fn mulaw_is_idempotent_after_one_trip(sample in i16::MIN..=i16::MAX) {
        let once = mulaw_expand(mulaw_compress(sample));
        let twice = mulaw_expand(mulaw_compress(once));
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn alaw_round_trip_is_bounded(sample in i16::MIN..=i16::MAX) {
        let decoded = alaw_expand(alaw_compress(sample)) as i32;
        prop_assert!((decoded - sample as i32).abs() <= 1024);
    }

    #[test]
    fn alaw_is_idempotent_after_one_trip(sample in i16::MIN..=i16::MAX) {
        let once = alaw_expand(alaw_compress(sample));
        let twice = alaw_expand(alaw_compress(once));
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn mulaw_preserves_ordering_of_magnitudes(a in 0i16..=32_000, b in 0i16..=32_000) {
        // Companding is monotonic on non-negative inputs
        let da = mulaw_expand(mulaw_compress(a));
        let db = mulaw_expand(mulaw_compress(b));
        if a <= b {
            prop_assert!(da <= db);
        } else {
            prop_assert!(da >= db);
        }
    }
}
