use std::marker::PhantomData;

use crate::{AllocationStrategy, DEFAULT_CAPACITY, DropPolicy, GrowableArray, Heap, Result};

/// Builder for creating an instance of [`GrowableArray`].
///
/// All settings are optional. Without any configuration the builder produces the same array as
/// [`GrowableArray::new()`]: [`DEFAULT_CAPACITY`] slots obtained from the [`Heap`] strategy.
///
/// # Examples
///
/// ```
/// use growable_array::{DropPolicy, GrowableArray, TrackingStrategy};
///
/// let tracking = TrackingStrategy::heap();
///
/// let mut array = GrowableArray::<u32>::builder()
///     .capacity(10)
///     .strategy(&tracking)
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build()?;
///
/// array.append(1)?;
/// assert_eq!(tracking.live_blocks(), 1);
///
/// array.clear();
/// # Ok::<(), growable_array::Error>(())
/// ```
#[derive(Debug)]
#[must_use]
pub struct GrowableArrayBuilder<T, A = Heap> {
    capacity: usize,
    strategy: A,
    drop_policy: DropPolicy,

    _element: PhantomData<fn() -> T>,
}

impl<T> GrowableArrayBuilder<T, Heap> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY.get(),
            strategy: Heap,
            drop_policy: DropPolicy::default(),
            _element: PhantomData,
        }
    }
}

impl<T, A: AllocationStrategy> GrowableArrayBuilder<T, A> {
    /// Sets the number of slots the array starts with.
    ///
    /// Zero is allowed and means the array allocates nothing until the first append.
    #[inline]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the allocation strategy that provides the array's memory.
    #[inline]
    pub fn strategy<B: AllocationStrategy>(self, strategy: B) -> GrowableArrayBuilder<T, B> {
        GrowableArrayBuilder {
            capacity: self.capacity,
            strategy,
            drop_policy: self.drop_policy,
            _element: PhantomData,
        }
    }

    /// Sets the [drop policy][DropPolicy] for the array. This governs how to treat remaining
    /// elements when the array is dropped.
    #[inline]
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the array with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`][crate::Error::AllocationFailure] if the strategy
    /// cannot provide the initial storage.
    pub fn build(self) -> Result<GrowableArray<T, A>> {
        GrowableArray::with_options(self.capacity, self.strategy, self.drop_policy)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::{Error, TrackingStrategy};

    // The builder never holds elements, so it is thread-mobile for any element type.
    assert_impl_all!(GrowableArrayBuilder<Cell<u32>>: Send, Sync);

    #[test]
    fn defaults_match_new() {
        let array = GrowableArray::<u64>::builder().build().unwrap();

        assert_eq!(array.capacity(), DEFAULT_CAPACITY.get());
        assert_eq!(array.drop_policy(), DropPolicy::MayDropItems);
        assert_eq!(*array.strategy(), Heap);
    }

    #[test]
    fn zero_capacity_does_not_allocate() {
        let tracking = TrackingStrategy::heap();

        let array = GrowableArray::<u64>::builder()
            .capacity(0)
            .strategy(&tracking)
            .build()
            .unwrap();

        assert_eq!(array.capacity(), 0);
        assert_eq!(tracking.allocations(), 0);
    }

    #[test]
    fn settings_are_applied() {
        let tracking = TrackingStrategy::heap();

        // The strategy can be set before or after the other settings.
        let array = GrowableArray::<u16>::builder()
            .strategy(&tracking)
            .capacity(32)
            .drop_policy(DropPolicy::MustNotDropItems)
            .build()
            .unwrap();

        assert_eq!(array.capacity(), 32);
        assert_eq!(array.drop_policy(), DropPolicy::MustNotDropItems);
        assert_eq!(tracking.live_bytes(), 64);
    }

    #[test]
    fn build_reports_allocation_failure() {
        let tracking = TrackingStrategy::heap().with_byte_limit(8);

        let result = GrowableArray::<u64>::builder()
            .capacity(2)
            .strategy(&tracking)
            .build();

        assert!(matches!(
            result,
            Err(Error::AllocationFailure {
                capacity: 2,
                element_size: 8
            })
        ));
    }
}
