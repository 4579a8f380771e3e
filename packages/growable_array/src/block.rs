use std::alloc::Layout;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};

use tracing::debug;

use crate::{AllocationStrategy, Error, Result};

/// A block of raw memory with room for `capacity` values of type `T`.
///
/// The block does not know which of its slots hold live values - the owner tracks that and
/// is responsible for destroying live values before releasing the block. Dropping a `Block`
/// does nothing: the memory must be returned via [`release()`][Self::release], which needs
/// the strategy that allocated it.
///
/// A block with zero capacity, as well as any block of a zero-sized type, owns no memory and
/// uses a dangling pointer. Such blocks never reach the allocation strategy.
#[derive(Debug)]
pub(crate) struct Block<T> {
    ptr: NonNull<T>,
    capacity: usize,

    _owns: PhantomData<T>,
}

impl<T> Block<T> {
    /// The largest number of slots a block of `T` can have.
    pub(crate) const MAX_CAPACITY: usize = if mem::size_of::<T>() == 0 {
        usize::MAX
    } else {
        isize::MAX.unsigned_abs() / mem::size_of::<T>()
    };

    /// A block without any slots.
    #[must_use]
    pub(crate) const fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            capacity: 0,
            _owns: PhantomData,
        }
    }

    /// Obtains a block with exactly `capacity` uninitialized slots from `strategy`.
    ///
    /// A zero capacity yields an empty block without consulting the strategy.
    pub(crate) fn allocate<A>(strategy: &A, capacity: usize) -> Result<Self>
    where
        A: AllocationStrategy + ?Sized,
    {
        if capacity == 0 {
            return Ok(Self::empty());
        }

        let failure = || Error::AllocationFailure {
            capacity,
            element_size: mem::size_of::<T>(),
        };

        if capacity > Self::MAX_CAPACITY {
            debug!(capacity, max_capacity = Self::MAX_CAPACITY, "block capacity exceeds maximum");
            return Err(failure());
        }

        let layout = Layout::array::<T>(capacity).map_err(|_| failure())?;

        if layout.size() == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                capacity,
                _owns: PhantomData,
            });
        }

        let Some(ptr) = strategy.allocate(layout) else {
            debug!(
                capacity,
                element_size = mem::size_of::<T>(),
                "allocation strategy refused block"
            );
            return Err(failure());
        };

        Ok(Self {
            ptr: ptr.cast::<T>(),
            capacity,
            _owns: PhantomData,
        })
    }

    /// Returns the block's memory to `strategy`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - the block was allocated from `strategy` (or a clone of it),
    /// - no slot of the block holds a live value that still needs to be destroyed.
    pub(crate) unsafe fn release<A>(self, strategy: &A)
    where
        A: AllocationStrategy + ?Sized,
    {
        let Some(layout) = self.layout() else {
            return;
        };

        // SAFETY: The block was allocated from this strategy with this exact layout, because
        // the layout is derived from the same element type and capacity as in `allocate()`.
        unsafe { strategy.deallocate(self.ptr.cast::<u8>(), layout) }
    }

    /// The layout of the memory owned by the block, or `None` if it owns no memory.
    #[must_use]
    fn layout(&self) -> Option<Layout> {
        if self.capacity == 0 {
            return None;
        }

        // Cannot fail, this layout was already calculated successfully in `allocate()`.
        let layout = Layout::array::<T>(self.capacity).ok()?;

        (layout.size() != 0).then_some(layout)
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    fn slot(&self, index: usize) -> NonNull<T> {
        debug_assert!(
            index < self.capacity,
            "slot {index} out of bounds in block of capacity {}",
            self.capacity
        );

        // SAFETY: The index is within the block, so the offset stays within the allocation.
        unsafe { self.ptr.add(index) }
    }

    /// Constructs `value` in the slot at `index`.
    ///
    /// Any value already in the slot is overwritten without being destroyed.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `index` is less than the capacity.
    pub(crate) unsafe fn write(&mut self, index: usize, value: T) {
        // SAFETY: The caller guarantees the index is in bounds, so the slot is valid for writes
        // and properly aligned.
        unsafe { self.slot(index).write(value) }
    }

    /// # Safety
    ///
    /// The caller must ensure that the slot at `index` holds a live value.
    #[must_use]
    pub(crate) unsafe fn get(&self, index: usize) -> &T {
        // SAFETY: The caller guarantees the slot holds a live value. The returned reference
        // borrows the block, so the value cannot be destroyed while it is in use.
        unsafe { self.slot(index).as_ref() }
    }

    /// # Safety
    ///
    /// The caller must ensure that the slot at `index` holds a live value.
    #[must_use]
    pub(crate) unsafe fn get_mut(&mut self, index: usize) -> &mut T {
        // SAFETY: The caller guarantees the slot holds a live value. We hold an exclusive
        // borrow of the block, so no other reference to the slot exists.
        unsafe { self.slot(index).as_mut() }
    }

    /// Shared view of the slots `0..len`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the slots `0..len` hold live values.
    #[must_use]
    pub(crate) unsafe fn as_slice(&self, len: usize) -> &[T] {
        debug_assert!(len <= self.capacity);

        // SAFETY: The caller guarantees the slots hold live values. A dangling pointer is
        // valid for zero-length and zero-sized slices.
        unsafe { NonNull::slice_from_raw_parts(self.ptr, len).as_ref() }
    }

    /// Destroys the values in the slots `start..end`, in index order.
    ///
    /// If a destructor panics, the remaining values in the range are still destroyed before
    /// the panic propagates.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - the slots `start..end` hold live values,
    /// - the slots are treated as uninitialized after this call, even if it panics.
    pub(crate) unsafe fn destroy(&mut self, start: usize, end: usize) {
        debug_assert!(start <= end && end <= self.capacity);

        if start == end {
            return;
        }

        // Cannot underflow, guarded by the assertion above.
        let count = end.wrapping_sub(start);

        // SAFETY: The range is within the block and holds live values, as guaranteed by the
        // caller. `drop_in_place` on a slice drops the elements in index order.
        unsafe {
            ptr::drop_in_place(NonNull::slice_from_raw_parts(self.slot(start), count).as_ptr());
        }
    }

    /// Moves the values in the slots `0..count` into the slots `0..count` of `target`.
    ///
    /// This is a bitwise move: afterwards the source slots are uninitialized and must not be
    /// destroyed, while the target slots hold live values.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - the slots `0..count` of `self` hold live values,
    /// - `count` does not exceed the capacity of `target`,
    /// - the slots `0..count` of `target` do not hold live values (they are overwritten).
    pub(crate) unsafe fn move_into(&mut self, target: &mut Self, count: usize) {
        debug_assert!(count <= self.capacity && count <= target.capacity);

        // SAFETY: Both ranges are within their blocks and the blocks are distinct allocations
        // (or zero-sized), so they do not overlap.
        unsafe { ptr::copy_nonoverlapping(self.ptr.as_ptr(), target.ptr.as_ptr(), count) }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::sync::Arc;

    use testing::{Lifecycle, Tracked};

    use super::*;
    use crate::TrackingStrategy;

    #[test]
    fn zero_capacity_does_not_allocate() {
        let tracking = TrackingStrategy::heap();

        let block = Block::<u64>::allocate(&tracking, 0).unwrap();
        assert_eq!(block.capacity(), 0);
        assert_eq!(tracking.allocations(), 0);

        unsafe { block.release(&tracking) };
        assert_eq!(tracking.deallocations(), 0);
    }

    #[test]
    fn zero_sized_type_does_not_allocate() {
        let tracking = TrackingStrategy::heap();

        let mut block = Block::<()>::allocate(&tracking, 1000).unwrap();
        assert_eq!(block.capacity(), 1000);
        assert_eq!(tracking.allocations(), 0);

        unsafe {
            block.write(999, ());
            block.destroy(999, 1000);
            block.release(&tracking);
        }

        assert_eq!(tracking.deallocations(), 0);
    }

    #[test]
    fn release_uses_allocation_layout() {
        let tracking = TrackingStrategy::heap();

        let block = Block::<u32>::allocate(&tracking, 7).unwrap();
        let layout = tracking
            .outstanding_layout(block.ptr.cast::<u8>())
            .unwrap();
        assert_eq!(layout, Layout::array::<u32>(7).unwrap());

        // The tracking strategy panics if the layout does not match.
        unsafe { block.release(&tracking) };
        assert_eq!(tracking.live_blocks(), 0);
    }

    #[test]
    fn refused_allocation_is_reported() {
        let tracking = TrackingStrategy::heap();
        tracking.fail_next_allocation();

        let result = Block::<u64>::allocate(&tracking, 4);

        assert!(matches!(
            result,
            Err(Error::AllocationFailure {
                capacity: 4,
                element_size: 8
            })
        ));
    }

    #[test]
    fn oversized_capacity_is_reported_without_consulting_strategy() {
        let tracking = TrackingStrategy::heap();

        let result = Block::<u64>::allocate(&tracking, Block::<u64>::MAX_CAPACITY + 1);

        assert!(matches!(result, Err(Error::AllocationFailure { .. })));
        assert_eq!(tracking.refusals(), 0);
    }

    #[test]
    fn write_get_and_slice() {
        let mut block = Block::<String>::allocate(&crate::Heap, 3).unwrap();

        unsafe {
            block.write(0, "zero".to_string());
            block.write(1, "one".to_string());

            assert_eq!(block.get(1), "one");
            block.get_mut(0).push('!');
            assert_eq!(block.as_slice(2), ["zero!", "one"]);

            block.destroy(0, 2);
            block.release(&crate::Heap);
        }
    }

    #[test]
    fn destroy_runs_in_index_order() {
        let lifecycle = Arc::new(Lifecycle::new());
        let mut block = Block::<Tracked>::allocate(&crate::Heap, 4).unwrap();

        unsafe {
            for index in 0..4 {
                block.write(index, Tracked::new(index as u32, &lifecycle));
            }

            block.destroy(1, 4);
            assert_eq!(lifecycle.drop_log(), [1, 2, 3]);

            block.destroy(0, 1);
            block.release(&crate::Heap);
        }

        assert_eq!(lifecycle.drop_log(), [1, 2, 3, 0]);
        assert_eq!(lifecycle.live(), 0);
    }

    #[test]
    fn move_into_transfers_without_drop() {
        let lifecycle = Arc::new(Lifecycle::new());
        let mut source = Block::<Tracked>::allocate(&crate::Heap, 2).unwrap();
        let mut target = Block::<Tracked>::allocate(&crate::Heap, 5).unwrap();

        unsafe {
            source.write(0, Tracked::new(10, &lifecycle));
            source.write(1, Tracked::new(20, &lifecycle));

            source.move_into(&mut target, 2);
            source.release(&crate::Heap);

            assert_eq!(lifecycle.drops(), 0);
            assert_eq!(target.get(0).value(), 10);
            assert_eq!(target.get(1).value(), 20);

            target.destroy(0, 2);
            target.release(&crate::Heap);
        }

        assert_eq!(lifecycle.drops(), 2);
        assert_eq!(lifecycle.clones(), 0);
    }
}
