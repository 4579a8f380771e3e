//! Capacity growth policy.
//!
//! The array grows before an append once the length has caught up with a third of the
//! capacity, not only when the array is full. This trades earlier reallocations for the
//! guarantee that the append about to happen always has a free slot after at most one
//! reallocation.

use std::num::NonZero;

use new_zealand::nz;

/// The multiplier applied to the capacity whenever the array grows.
pub const GROWTH_FACTOR: NonZero<usize> = nz!(3);

/// Whether an array with `len` live elements and `capacity` slots must grow before the next
/// append.
///
/// An array that has reached `max_capacity` never grows again.
#[must_use]
pub(crate) fn should_expand(len: usize, capacity: usize, max_capacity: usize) -> bool {
    debug_assert!(len <= capacity);

    if capacity >= max_capacity {
        return false;
    }

    capacity == 0 || capacity / GROWTH_FACTOR <= len
}

/// The capacity an array with `capacity` slots grows to.
///
/// An empty block counts as one slot, so the first growth step of an unallocated array
/// yields [`GROWTH_FACTOR`] slots. The result saturates at `max_capacity`.
#[must_use]
pub(crate) fn expanded_capacity(capacity: usize, max_capacity: usize) -> usize {
    let base = capacity.max(1);

    base.checked_mul(GROWTH_FACTOR.get())
        .map_or(max_capacity, |expanded| expanded.min(max_capacity))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn unallocated_array_always_expands() {
        assert!(should_expand(0, 0, usize::MAX));
    }

    #[test]
    fn expands_early_once_len_reaches_a_third() {
        // This tests a specific growth factor. Expect to update this test if it changes.
        assert!(!should_expand(2, 9, usize::MAX));
        assert!(should_expand(3, 9, usize::MAX));
        assert!(should_expand(1, 3, usize::MAX));
        assert!(!should_expand(0, 3, usize::MAX));

        // Integer division means tiny blocks expand even when empty.
        assert!(should_expand(0, 1, usize::MAX));
        assert!(should_expand(0, 2, usize::MAX));
    }

    #[test]
    fn never_expands_at_max_capacity() {
        assert!(!should_expand(100, 100, 100));
        assert!(!should_expand(0, 100, 100));
    }

    #[test]
    fn expanded_capacity_multiplies() {
        assert_eq!(expanded_capacity(0, usize::MAX), 3);
        assert_eq!(expanded_capacity(1, usize::MAX), 3);
        assert_eq!(expanded_capacity(3, usize::MAX), 9);
        assert_eq!(expanded_capacity(9, usize::MAX), 27);
    }

    #[test]
    fn expanded_capacity_saturates_at_max() {
        assert_eq!(expanded_capacity(40, 100), 100);
        assert_eq!(expanded_capacity(usize::MAX / 2, usize::MAX), usize::MAX);
    }

    #[test]
    fn expansion_always_leaves_room() {
        // Whenever the policy decides not to expand, there must be a free slot.
        for capacity in 1..200 {
            for len in 0..=capacity {
                if !should_expand(len, capacity, usize::MAX) {
                    assert!(len < capacity, "len {len} capacity {capacity} left no room");
                } else {
                    assert!(len < expanded_capacity(capacity, usize::MAX));
                }
            }
        }
    }
}
