// Property tests for the pure arithmetic the preview channel leans on:
// aspect-fit downsizing and ring loss accounting.

use framesink::preview::{fit_within, lost_frames};
use proptest::prelude::*;

proptest! {
    #[test]
    fn fit_never_exceeds_bounds(
        w in 1u32..8192,
        h in 1u32..8192,
        max_w in 1u32..4096,
        max_h in 1u32..4096,
    ) {
        let (out_w, out_h) = fit_within(w, h, max_w, max_h);
        prop_assert!(out_w <= max_w);
        prop_assert!(out_h <= max_h);
        prop_assert!(out_w >= 1 && out_h >= 1);
    }

    #[test]
    fn fit_never_upscales(
        w in 1u32..8192,
        h in 1u32..8192,
        max_w in 1u32..4096,
        max_h in 1u32..4096,
    ) {
        let (out_w, out_h) = fit_within(w, h, max_w, max_h);
        prop_assert!(out_w <= w);
        prop_assert!(out_h <= h);
    }

    #[test]
    fn fit_is_identity_when_already_inside(
        w in 1u32..4096,
        h in 1u32..4096,
    ) {
        let (out_w, out_h) = fit_within(w, h, w, h);
        prop_assert_eq!((out_w, out_h), (w, h));
        let (out_w, out_h) = fit_within(w, h, w + 100, h + 100);
        prop_assert_eq!((out_w, out_h), (w, h));
    }

    #[test]
    fn no_loss_within_one_ring(
        behind in 0u64..64,
        slot_count in 1u32..64,
        published in 0u64..1_000_000,
    ) {
        // A reader at most slot_count frames behind has lost nothing.
        let behind = behind.min(slot_count as u64).min(published);
        let cursor = published - behind;
        prop_assert_eq!(lost_frames(cursor, published, slot_count), 0);
    }

    #[test]
    fn loss_is_bounded_by_distance(
        cursor in 0u64..1_000_000,
        extra in 0u64..1_000_000,
        slot_count in 1u32..64,
    ) {
        let write_cursor = cursor + extra;
        let lost = lost_frames(cursor, write_cursor, slot_count);
        // Never more than the frames actually published past the cursor,
        // and exactly the overflow beyond the ring's depth.
        prop_assert!(lost <= extra);
        prop_assert_eq!(lost, extra.saturating_sub(slot_count as u64));
    }

    #[test]
    fn loss_is_monotone_in_write_cursor(
        cursor in 0u64..1_000_000,
        a in 0u64..1_000_000,
        b in 0u64..1_000_000,
        slot_count in 1u32..64,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            lost_frames(cursor, cursor + lo, slot_count)
                <= lost_frames(cursor, cursor + hi, slot_count)
        );
    }
}
