//! Alignment and growth-policy arithmetic.
//!
//! All functions are pure and return `None` instead of wrapping on
//! overflow, so an absurd request surfaces as an allocation failure.

use crate::config::CACHE_LINE_SIZE;

/// A new block must fit at least this many allocations of the size that
/// triggered its creation.
pub const ALLOCATIONS_PER_BLOCK: usize = 4;

/// The growth target is re-tuned once it drops below this many multiples
/// of the triggering size.
pub const RETUNE_FACTOR: usize = 2 * ALLOCATIONS_PER_BLOCK;

/// Smallest multiple of [`CACHE_LINE_SIZE`] that is `>= n`.
#[inline]
pub fn round_to_cache_line(n: usize) -> Option<usize> {
    n.checked_next_multiple_of(CACHE_LINE_SIZE)
}

/// Smallest power of two that is `>= n`. `n` must be non-zero.
#[inline]
pub fn round_up_pow2(n: usize) -> Option<usize> {
    debug_assert!(n != 0, "round_up_pow2 called with zero");
    n.checked_next_power_of_two()
}

/// Block size to request next, given the current target and the
/// cache-line-rounded size of the allocation that did not fit.
///
/// The target never shrinks.
pub fn next_growth_target(current: usize, size: usize) -> Option<usize> {
    let retune_at = size.checked_mul(RETUNE_FACTOR)?;
    if current >= retune_at {
        return Some(current);
    }
    let candidate = round_up_pow2(size.checked_mul(ALLOCATIONS_PER_BLOCK)?)?;
    Some(current.max(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_line_rounding() {
        assert_eq!(round_to_cache_line(0), Some(0));
        assert_eq!(round_to_cache_line(1), Some(CACHE_LINE_SIZE));
        assert_eq!(round_to_cache_line(CACHE_LINE_SIZE), Some(CACHE_LINE_SIZE));
        assert_eq!(
            round_to_cache_line(CACHE_LINE_SIZE + 1),
            Some(2 * CACHE_LINE_SIZE)
        );
        assert_eq!(round_to_cache_line(usize::MAX), None);
    }

    #[test]
    fn pow2_rounding() {
        assert_eq!(round_up_pow2(1), Some(1));
        assert_eq!(round_up_pow2(3), Some(4));
        assert_eq!(round_up_pow2(4096), Some(4096));
        assert_eq!(round_up_pow2(4097), Some(8192));
        assert_eq!(round_up_pow2(usize::MAX), None);
    }

    #[test]
    fn small_requests_keep_target() {
        // 8 * 64 = 512 > 64, so a single cache line retunes a 64-byte target.
        assert_eq!(next_growth_target(64, 64), Some(256));
        // Already comfortably large.
        assert_eq!(next_growth_target(4096, 64), Some(4096));
    }

    #[test]
    fn target_never_shrinks() {
        // 8 * 1024 > 4096 triggers a retune, but 4 * 1024 rounds to 4096,
        // which is not larger than the current target.
        assert_eq!(next_growth_target(4096, 1024), Some(4096));
        assert_eq!(next_growth_target(6000, 1024), Some(6000));
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(next_growth_target(64, usize::MAX / 2), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn rounded_size_is_aligned_and_minimal(n in 0usize..1 << 40) {
                let r = round_to_cache_line(n).unwrap();
                prop_assert_eq!(r % CACHE_LINE_SIZE, 0);
                prop_assert!(r >= n);
                prop_assert!(r - n < CACHE_LINE_SIZE);
            }

            #[test]
            fn growth_leaves_room_for_four(
                current in 1usize..1 << 30,
                lines in 1usize..1 << 16,
            ) {
                let size = lines * CACHE_LINE_SIZE;
                let next = next_growth_target(current, size).unwrap();
                prop_assert!(next >= current);
                prop_assert!(next >= ALLOCATIONS_PER_BLOCK * size);
            }
        }
    }
}
