use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// A source of raw memory blocks for a [`GrowableArray`][crate::GrowableArray].
///
/// Allocation strategies only deal in raw memory. Placing values into that memory and
/// destroying them again is the job of the container, so a strategy never sees a typed
/// value. This makes it possible to substitute arena, pool or tracking strategies without
/// modifying the container.
///
/// The container describes every request with a [`Layout`] derived from the element type
/// and the number of slots (`Layout::array::<T>(capacity)`), and releases every block with
/// the exact layout it was allocated with. The container never requests zero-sized layouts.
///
/// # Safety
///
/// Implementations must return either `None` or a pointer to a block that:
///
/// * is valid for reads and writes of `layout.size()` bytes,
/// * is aligned to `layout.align()`,
/// * does not overlap any other block that is still allocated from this strategy,
/// * remains valid until it is passed to [`deallocate()`][Self::deallocate].
///
/// If the strategy implements [`Clone`], every clone must be able to deallocate blocks
/// allocated by any other clone of the same strategy.
pub unsafe trait AllocationStrategy {
    /// Obtains a block of memory that fits `layout`, or `None` if the strategy cannot
    /// satisfy the request.
    ///
    /// The contents of the block are uninitialized.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Returns a block of memory to the strategy.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` was returned by [`allocate()`][Self::allocate] on
    /// this strategy (or a clone of it) with the same `layout`, and that the block has not
    /// already been deallocated.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Allocation strategy backed by the global allocator.
///
/// This is the default strategy of [`GrowableArray`][crate::GrowableArray].
///
/// # Examples
///
/// ```
/// use growable_array::{GrowableArray, Heap};
///
/// let mut array = GrowableArray::with_capacity_in(4, Heap).unwrap();
/// array.append("on the heap").unwrap();
///
/// assert_eq!(array.capacity(), 4);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Heap;

// SAFETY: The global allocator upholds the block validity requirements and any instance of
// `Heap` can release blocks allocated by any other instance.
unsafe impl AllocationStrategy for Heap {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(
            layout.size() > 0,
            "zero-sized layouts must never reach an allocation strategy"
        );

        // SAFETY: The layout has a non-zero size, as required by `alloc()`. The container
        // never forwards zero-sized requests.
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding the safety requirements to the caller, who guarantees that the
        // pointer came from `allocate()` above with the same layout.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

// SAFETY: A shared reference forwards to the referenced strategy, which upholds the trait
// requirements itself. All copies of the reference refer to the same strategy instance.
unsafe impl<S> AllocationStrategy for &S
where
    S: AllocationStrategy + ?Sized,
{
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding the safety requirements to the caller.
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Heap: AllocationStrategy, Send, Sync, Copy);
    assert_impl_all!(&'static Heap: AllocationStrategy, Send, Sync);

    #[test]
    fn heap_round_trip_block_is_writable() {
        let layout = Layout::array::<u64>(4).unwrap();

        let ptr = Heap.allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr().align_offset(layout.align()), 0);

        unsafe {
            let slots = ptr.cast::<u64>();
            for index in 0..4 {
                slots.add(index).write(index as u64 * 10);
            }
            assert_eq!(slots.add(3).read(), 30);

            Heap.deallocate(ptr, layout);
        }
    }

    #[test]
    fn reference_forwards_to_referenced_strategy() {
        let strategy = &Heap;
        let layout = Layout::new::<u32>();

        let ptr = strategy.allocate(layout).unwrap();

        unsafe {
            ptr.cast::<u32>().write(42);
            assert_eq!(ptr.cast::<u32>().read(), 42);
            strategy.deallocate(ptr, layout);
        }
    }
}
