//! Splitter properties: exact segment count, lossless concatenation,
//! and determinism over arbitrary buffers.

use proptest::prelude::*;

use crate::core::audio::split_pcm;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_exact_count_and_lossless(
        pcm in proptest::collection::vec(any::<u8>(), 0..20_000),
        expected_count in 1usize..6,
        sample_rate in prop_oneof![Just(16_000u32), Just(24_000u32)],
    ) {
        let segments = split_pcm(&pcm, sample_rate, expected_count);

        prop_assert_eq!(segments.len(), expected_count);

        let rebuilt: Vec<u8> = segments.iter().flatten().copied().collect();
        prop_assert_eq!(rebuilt, pcm);
    }

    #[test]
    fn prop_deterministic(
        pcm in proptest::collection::vec(any::<u8>(), 0..20_000),
        expected_count in 1usize..6,
    ) {
        let first = split_pcm(&pcm, 24_000, expected_count);
        let second = split_pcm(&pcm, 24_000, expected_count);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_segments_align_on_samples(
        pcm in proptest::collection::vec(any::<u8>(), 0..20_000),
        expected_count in 2usize..6,
    ) {
        let segments = split_pcm(&pcm, 24_000, expected_count);

        // Every boundary except the final one must land on an even
        // byte offset so no segment starts mid-sample.
        let mut offset = 0usize;
        for segment in &segments[..segments.len() - 1] {
            offset += segment.len();
            prop_assert_eq!(offset % 2, 0);
        }
    }
}
