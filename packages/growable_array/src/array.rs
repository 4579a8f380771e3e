use std::any::type_name;
use std::fmt;
use std::mem;
use std::num::NonZero;
use std::thread;

use new_zealand::nz;
use tracing::{debug, trace};

use crate::growth::{expanded_capacity, should_expand};
use crate::{AllocationStrategy, Block, DropPolicy, Error, GrowableArrayBuilder, Heap, Result};

/// The capacity of an array created by [`GrowableArray::new()`] or by a builder without an
/// explicit capacity.
pub const DEFAULT_CAPACITY: NonZero<usize> = nz!(1);

/// A contiguous growable array that manages its storage explicitly.
///
/// The array owns one block of memory with room for [`capacity()`][Self::capacity] elements,
/// of which the first [`len()`][Self::len] hold live values. The block is obtained from an
/// [`AllocationStrategy`] (the global allocator via [`Heap`] by default) and the array places
/// values into it and destroys them itself.
///
/// # Growth
///
/// Before every append, the array checks whether the length has reached a third of the
/// capacity and if so grows the capacity by a factor of [`GROWTH_FACTOR`][crate::GROWTH_FACTOR]
/// before inserting. Starting from the default capacity of 1, appending four values yields
/// the capacity sequence `1 → 3 → 9 → 9 → 27`.
///
/// # Failure modes
///
/// Operations that need memory return [`Error::AllocationFailure`] when the strategy cannot
/// provide it, leaving the array exactly as it was. Element access returns
/// [`Error::IndexOutOfRange`] for indexes at or beyond the length.
///
/// # Examples
///
/// ```
/// use growable_array::GrowableArray;
///
/// let mut array = GrowableArray::new()?;
/// assert_eq!(array.capacity(), 1);
///
/// array.append(10)?;
/// array.append(20)?;
///
/// assert_eq!(array.len(), 2);
/// assert_eq!(*array.at(1)?, 20);
///
/// *array.at_mut(0)? += 5;
/// assert_eq!(*array.at(0)?, 15);
///
/// assert!(array.at(2).is_err());
/// # Ok::<(), growable_array::Error>(())
/// ```
///
/// # Ownership transfer
///
/// Moving the array with ordinary Rust moves transfers its block without touching the
/// elements. When the source must remain usable, [`take()`][Self::take] and
/// [`move_from()`][Self::move_from] perform the same transfer and leave the source empty,
/// with zero capacity and no block.
///
/// # Thread safety
///
/// The array is [`Send`] if its elements and strategy are, and [`Sync`] if they are. All
/// mutation requires an exclusive reference, so the array never needs internal
/// synchronization.
pub struct GrowableArray<T, A: AllocationStrategy = Heap> {
    /// Slots `0..len` hold live values, the rest are uninitialized.
    block: Block<T>,

    len: usize,

    /// The strategy that allocated `block` and that must release it.
    strategy: A,

    drop_policy: DropPolicy,
}

// SAFETY: The array exclusively owns its block and the values in it, so sending the array
// sends the values. The strategy travels along with the block it allocated.
unsafe impl<T: Send, A: AllocationStrategy + Send> Send for GrowableArray<T, A> {}

// SAFETY: Shared references to the array only permit reading the values and querying the
// strategy, both of which are safe to share if the types themselves are `Sync`.
unsafe impl<T: Sync, A: AllocationStrategy + Sync> Sync for GrowableArray<T, A> {}

impl<T> GrowableArray<T, Heap> {
    /// Creates a builder for configuring and constructing a [`GrowableArray`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use growable_array::GrowableArray;
    ///
    /// let array = GrowableArray::<String>::builder().capacity(16).build()?;
    ///
    /// assert_eq!(array.capacity(), 16);
    /// assert!(array.is_empty());
    /// # Ok::<(), growable_array::Error>(())
    /// ```
    #[inline]
    pub fn builder() -> GrowableArrayBuilder<T, Heap> {
        GrowableArrayBuilder::new()
    }

    /// Creates an array with room for [`DEFAULT_CAPACITY`] elements on the heap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the memory cannot be allocated.
    pub fn new() -> Result<Self> {
        Self::new_in(Heap)
    }

    /// Creates an array with room for exactly `capacity` elements on the heap.
    ///
    /// A capacity of zero allocates nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the memory cannot be allocated.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_capacity_in(capacity, Heap)
    }

    /// Creates an array with zero capacity that uses the heap once it needs memory.
    #[must_use]
    pub const fn empty() -> Self {
        Self::empty_in(Heap)
    }
}

impl<T, A: AllocationStrategy> GrowableArray<T, A> {
    /// The largest capacity an array of `T` can reach.
    ///
    /// Once the capacity reaches this limit the array stops growing and appends fail with
    /// [`Error::AllocationFailure`] when no free slot remains.
    pub const MAX_CAPACITY: usize = Block::<T>::MAX_CAPACITY;

    /// Creates an array with room for [`DEFAULT_CAPACITY`] elements, obtained from `strategy`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the strategy cannot provide the memory.
    pub fn new_in(strategy: A) -> Result<Self> {
        Self::with_capacity_in(DEFAULT_CAPACITY.get(), strategy)
    }

    /// Creates an array with room for exactly `capacity` elements, obtained from `strategy`.
    ///
    /// No elements are constructed. A capacity of zero does not consult the strategy.
    ///
    /// # Example
    ///
    /// ```rust
    /// use growable_array::{GrowableArray, TrackingStrategy};
    ///
    /// let tracking = TrackingStrategy::heap();
    /// let array = GrowableArray::<u64, _>::with_capacity_in(5, &tracking)?;
    ///
    /// assert_eq!(array.capacity(), 5);
    /// assert_eq!(array.len(), 0);
    /// assert_eq!(tracking.live_bytes(), 40);
    /// # Ok::<(), growable_array::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the strategy cannot provide the memory.
    pub fn with_capacity_in(capacity: usize, strategy: A) -> Result<Self> {
        Self::with_options(capacity, strategy, DropPolicy::default())
    }

    /// Creates an array with zero capacity that obtains memory from `strategy` once it
    /// needs some.
    ///
    /// This is the same state a moved-from array is left in.
    #[must_use]
    pub const fn empty_in(strategy: A) -> Self {
        Self {
            block: Block::empty(),
            len: 0,
            strategy,
            drop_policy: DropPolicy::MayDropItems,
        }
    }

    pub(crate) fn with_options(
        capacity: usize,
        strategy: A,
        drop_policy: DropPolicy,
    ) -> Result<Self> {
        let block = Block::allocate(&strategy, capacity)?;

        Ok(Self {
            block,
            len: 0,
            strategy,
            drop_policy,
        })
    }

    /// The number of live elements in the array.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// The number of elements the array can hold in its current block.
    ///
    /// This is always greater than or equal to [`len()`][Self::len].
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.block.capacity()
    }

    /// Whether the array holds no live elements.
    ///
    /// An empty array may still be holding a block of memory.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The allocation strategy that provides the array's memory.
    #[must_use]
    #[inline]
    pub fn strategy(&self) -> &A {
        &self.strategy
    }

    /// The [drop policy][DropPolicy] the array was created with.
    #[must_use]
    #[inline]
    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }

    /// Returns a reference to the live element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index` is not less than [`len()`][Self::len].
    /// Allocated but unused capacity is not addressable.
    #[inline]
    pub fn at(&self, index: usize) -> Result<&T> {
        self.check_index(index)?;

        // SAFETY: The index is below the length, so the slot holds a live value.
        Ok(unsafe { self.block.get(index) })
    }

    /// Returns a mutable reference to the live element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index` is not less than [`len()`][Self::len].
    #[inline]
    pub fn at_mut(&mut self, index: usize) -> Result<&mut T> {
        self.check_index(index)?;

        // SAFETY: The index is below the length, so the slot holds a live value.
        Ok(unsafe { self.block.get_mut(index) })
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.len {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.len,
            });
        }

        Ok(())
    }

    /// Reallocates the array's storage to exactly `new_capacity` slots.
    ///
    /// The new block is obtained before anything else happens, so if the strategy cannot
    /// provide it the array is left untouched. Live elements are then moved into the new block
    /// in index order and the old block is released.
    ///
    /// If `new_capacity` is less than the length, the elements that do not fit are destroyed
    /// in index order and the length becomes `new_capacity`.
    ///
    /// A `new_capacity` of zero does nothing: use [`clear()`][Self::clear] to release the
    /// storage entirely.
    ///
    /// # Example
    ///
    /// ```rust
    /// use growable_array::GrowableArray;
    ///
    /// let mut array = GrowableArray::new()?;
    /// array.append('a')?;
    ///
    /// array.reserve(100)?;
    /// assert_eq!(array.capacity(), 100);
    ///
    /// // Zero is ignored rather than treated as a request to shrink.
    /// array.reserve(0)?;
    /// assert_eq!(array.capacity(), 100);
    /// # Ok::<(), growable_array::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the strategy cannot provide the new block.
    pub fn reserve(&mut self, new_capacity: usize) -> Result<()> {
        if new_capacity == 0 {
            return Ok(());
        }

        self.reallocate(new_capacity)
    }

    /// Shrinks the capacity to exactly the length, releasing unused slots.
    ///
    /// An empty array keeps its block, as this is equivalent to `reserve(len())`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the strategy cannot provide the new block. The
    /// array keeps its previous block in that case.
    pub fn shrink_to_fit(&mut self) -> Result<()> {
        self.reserve(self.len)
    }

    fn reallocate(&mut self, new_capacity: usize) -> Result<()> {
        let new_block = Block::allocate(&self.strategy, new_capacity)?;

        let old_len = self.len;
        let retained = old_len.min(new_capacity);

        let mut old_block = mem::replace(&mut self.block, new_block);

        // SAFETY: The old slots `0..retained` hold live values and the new block has room for
        // them. The new block is fresh, so none of its slots hold live values yet.
        unsafe {
            old_block.move_into(&mut self.block, retained);
        }

        self.len = retained;

        trace!(
            old_capacity = old_block.capacity(),
            new_capacity,
            retained,
            "reallocated storage"
        );

        let strategy = &self.strategy;

        // The old block is released even if destroying the truncated values panics.
        let mut old_block = scopeguard::guard(old_block, |old_block| {
            // SAFETY: The old block came from this strategy. Its retained values were moved out
            // and the truncated values are destroyed below, so it holds no live values.
            unsafe { old_block.release(strategy) }
        });

        // SAFETY: The slots `retained..old_len` of the old block still hold live values that
        // were not moved. After this they are treated as uninitialized.
        unsafe {
            old_block.destroy(retained, old_len);
        }

        Ok(())
    }

    /// Grows the storage ahead of an append if the growth policy calls for it.
    fn try_expand_capacity(&mut self) -> Result<()> {
        let capacity = self.capacity();

        if !should_expand(self.len, capacity, Self::MAX_CAPACITY) {
            return Ok(());
        }

        let new_capacity = expanded_capacity(capacity, Self::MAX_CAPACITY);
        trace!(len = self.len, capacity, new_capacity, "expanding capacity");

        self.reallocate(new_capacity)
    }

    /// Index of the slot the next appended element goes into, growing the storage first if
    /// needed.
    fn prepare_append(&mut self) -> Result<usize> {
        self.try_expand_capacity()?;

        let index = self.len;
        self.ensure_free_slot(index)?;

        Ok(index)
    }

    #[cfg_attr(test, mutants::skip)] // Only reachable when full at MAX_CAPACITY, too big to test.
    fn ensure_free_slot(&self, index: usize) -> Result<()> {
        if index < self.capacity() {
            return Ok(());
        }

        debug!(
            capacity = self.capacity(),
            max_capacity = Self::MAX_CAPACITY,
            "array is full at maximum capacity"
        );

        Err(Error::AllocationFailure {
            capacity: index.saturating_add(1),
            element_size: mem::size_of::<T>(),
        })
    }

    /// Appends `value` after the last live element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the array needed to grow and the strategy could
    /// not provide the memory. The array is unchanged and `value` is dropped.
    pub fn append(&mut self, value: T) -> Result<()> {
        let index = self.prepare_append()?;

        // SAFETY: `prepare_append()` guarantees that the slot is within the capacity. It is at
        // the length, so it does not hold a live value.
        unsafe {
            self.block.write(index, value);
        }

        // Cannot overflow, the index is below the capacity.
        self.len = index.wrapping_add(1);

        Ok(())
    }

    /// Constructs a new element after the last live element and returns a reference to it.
    ///
    /// The `construct` closure is only called once room for the element has been secured, so
    /// nothing is built if the array cannot grow. If the closure panics, the array is left
    /// without the new element (though it may already have grown).
    ///
    /// # Example
    ///
    /// ```rust
    /// use growable_array::GrowableArray;
    ///
    /// let mut array = GrowableArray::new()?;
    ///
    /// let greeting = array.emplace(|| String::with_capacity(32))?;
    /// greeting.push_str("Hello");
    ///
    /// assert_eq!(array.at(0)?, "Hello");
    /// # Ok::<(), growable_array::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the array needed to grow and the strategy could
    /// not provide the memory. The closure is not called in that case.
    pub fn emplace<F>(&mut self, construct: F) -> Result<&mut T>
    where
        F: FnOnce() -> T,
    {
        let index = self.prepare_append()?;

        // SAFETY: `prepare_append()` guarantees that the slot is within the capacity. It is at
        // the length, so it does not hold a live value.
        unsafe {
            self.block.write(index, construct());
        }

        // Cannot overflow, the index is below the capacity.
        self.len = index.wrapping_add(1);

        // SAFETY: We just constructed the value in this slot.
        Ok(unsafe { self.block.get_mut(index) })
    }

    /// Destroys the last live element.
    ///
    /// # Panics
    ///
    /// Panics if the array is empty. Removing from an empty array is a contract violation, not
    /// a recoverable error.
    pub fn remove_last(&mut self) {
        assert!(
            !self.is_empty(),
            "remove_last() called on an empty GrowableArray<{}>",
            type_name::<T>()
        );

        // Cannot underflow, guarded by the assertion above.
        let index = self.len.wrapping_sub(1);

        // The length is reduced first, so a panicking destructor leaks the value instead of
        // leaving it counted as live.
        self.len = index;

        // SAFETY: The slot held the last live value. It is no longer counted as live.
        unsafe {
            self.block.destroy(index, index.wrapping_add(1));
        }
    }

    /// Grows the array to `new_size` elements, filling the new slots with clones of `fill`.
    ///
    /// Does nothing if `new_size` does not exceed the current length: resizing never removes
    /// elements.
    ///
    /// # Example
    ///
    /// ```rust
    /// use growable_array::GrowableArray;
    ///
    /// let mut array = GrowableArray::empty();
    /// array.resize(5, 99)?;
    ///
    /// assert_eq!(array.len(), 5);
    /// assert_eq!(array.capacity(), 5);
    /// assert_eq!(*array.at(4)?, 99);
    ///
    /// // Shrinking requests are ignored.
    /// array.resize(2, 0)?;
    /// assert_eq!(array.len(), 5);
    /// # Ok::<(), growable_array::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the array needed more capacity and the strategy
    /// could not provide it. The array is unchanged in that case.
    pub fn resize(&mut self, new_size: usize, fill: T) -> Result<()>
    where
        T: Clone,
    {
        self.resize_with(new_size, || fill.clone())
    }

    /// Grows the array to `new_size` elements, filling the new slots with default values.
    ///
    /// Does nothing if `new_size` does not exceed the current length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the array needed more capacity and the strategy
    /// could not provide it. The array is unchanged in that case.
    pub fn resize_default(&mut self, new_size: usize) -> Result<()>
    where
        T: Default,
    {
        self.resize_with(new_size, T::default)
    }

    fn resize_with(&mut self, new_size: usize, mut make: impl FnMut() -> T) -> Result<()> {
        if new_size <= self.len {
            return Ok(());
        }

        if new_size > self.capacity() {
            self.reserve(new_size)?;
        }

        for index in self.len..new_size {
            // SAFETY: The index is below `new_size`, which is within the capacity, and at or
            // beyond the length, so the slot does not hold a live value.
            unsafe {
                self.block.write(index, make());
            }

            // Counting each value as soon as it exists keeps it owned if `make()` panics later.
            // Cannot overflow, the index is below the capacity.
            self.len = index.wrapping_add(1);
        }

        Ok(())
    }

    /// Destroys all live elements and releases the storage entirely.
    ///
    /// Afterwards the array has zero capacity, the same state as a moved-from array. It can
    /// still be used and allocates a new block on the next append.
    pub fn clear(&mut self) {
        let len = mem::replace(&mut self.len, 0);
        let block = mem::replace(&mut self.block, Block::empty());

        let strategy = &self.strategy;

        let mut block = scopeguard::guard(block, |block| {
            // SAFETY: The block came from this strategy and its values are destroyed below.
            unsafe { block.release(strategy) }
        });

        // SAFETY: The slots `0..len` held the live values. The array no longer counts them,
        // so they are treated as uninitialized after this.
        unsafe {
            block.destroy(0, len);
        }
    }

    /// Transfers the storage of `source` into `self` and returns `self`.
    ///
    /// The live elements and storage previously held by `self` are destroyed and released
    /// first. The elements of `source` are not touched: the block changes owners. Afterwards
    /// `source` is empty with zero capacity and no storage, but remains usable.
    ///
    /// The two arrays also exchange allocation strategies, because a block must be released
    /// through the strategy that allocated it.
    ///
    /// # Example
    ///
    /// ```rust
    /// use growable_array::GrowableArray;
    ///
    /// let mut source = GrowableArray::new()?;
    /// source.append(1)?;
    /// source.append(2)?;
    ///
    /// let mut destination = GrowableArray::new()?;
    /// destination.append(100)?;
    ///
    /// destination.move_from(&mut source).append(3)?;
    ///
    /// assert_eq!(destination.len(), 3);
    /// assert_eq!(*destination.at(0)?, 1);
    /// assert_eq!(source.len(), 0);
    /// assert_eq!(source.capacity(), 0);
    /// # Ok::<(), growable_array::Error>(())
    /// ```
    pub fn move_from(&mut self, source: &mut Self) -> &mut Self {
        self.clear();

        self.block = mem::replace(&mut source.block, Block::empty());
        self.len = mem::replace(&mut source.len, 0);
        mem::swap(&mut self.strategy, &mut source.strategy);

        self
    }

    /// Takes the storage out of `self` into a new array, leaving `self` empty with zero
    /// capacity and no storage.
    ///
    /// This is a constant-time transfer. The new array has the same elements, length and
    /// capacity as `self` had, and the same drop policy.
    #[must_use]
    pub fn take(&mut self) -> Self
    where
        A: Clone,
    {
        let mut taken = Self::empty_in(self.strategy.clone());
        taken.drop_policy = self.drop_policy;
        taken.move_from(self);
        taken
    }

    /// Creates an independent copy of the array.
    ///
    /// The copy has the same length and capacity, its own block obtained from a clone of the
    /// strategy, and a clone of every live element in the same order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the strategy cannot provide the block.
    pub fn try_clone(&self) -> Result<Self>
    where
        T: Clone,
        A: Clone,
    {
        self.duplicate_in(self.strategy.clone())
    }

    /// Replaces the contents of `self` with copies of the elements of `source` and returns
    /// `self`.
    ///
    /// The copy is built completely before the previous contents of `self` are destroyed and
    /// released, so on failure `self` is unchanged. The new block has the same capacity as
    /// `source` and is obtained from `self`'s strategy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the strategy cannot provide the block.
    pub fn try_clone_from(&mut self, source: &Self) -> Result<&mut Self>
    where
        T: Clone,
        A: Clone,
    {
        let mut duplicate = source.duplicate_in(self.strategy.clone())?;
        Ok(self.move_from(&mut duplicate))
    }

    /// Copies the array into a new block obtained from `strategy`.
    ///
    /// If cloning an element panics, the partial copy is dropped during unwinding, which
    /// destroys the elements cloned so far and releases the block.
    fn duplicate_in(&self, strategy: A) -> Result<Self>
    where
        T: Clone,
    {
        // The duplicate always starts with the permissive policy so that tearing down a
        // partial copy never panics a second time during unwinding.
        let mut duplicate = Self::with_options(self.capacity(), strategy, DropPolicy::MayDropItems)?;

        for index in 0..self.len {
            // SAFETY: The index is below our length, so the slot holds a live value.
            let value = unsafe { self.block.get(index) }.clone();

            // SAFETY: The duplicate has the same capacity as us and has not yet constructed a
            // value in this slot.
            unsafe {
                duplicate.block.write(index, value);
            }

            // Cannot overflow, the index is below the capacity.
            duplicate.len = index.wrapping_add(1);
        }

        duplicate.drop_policy = self.drop_policy;

        Ok(duplicate)
    }
}

impl<T: Clone, A: AllocationStrategy + Clone> Clone for GrowableArray<T, A> {
    /// # Panics
    ///
    /// Panics if the allocation strategy cannot provide the memory for the copy. Use
    /// [`try_clone()`][Self::try_clone] to handle this case.
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(duplicate) => duplicate,
            Err(error) => panic!("cannot clone GrowableArray: {error}"),
        }
    }

    /// # Panics
    ///
    /// Panics if the allocation strategy cannot provide the memory for the copy. Use
    /// [`try_clone_from()`][Self::try_clone_from] to handle this case.
    fn clone_from(&mut self, source: &Self) {
        if let Err(error) = self.try_clone_from(source) {
            panic!("cannot clone GrowableArray: {error}");
        }
    }
}

impl<T, A: AllocationStrategy> Drop for GrowableArray<T, A> {
    fn drop(&mut self) {
        // Panicking again while unwinding would abort the process.
        if !thread::panicking() && self.drop_policy == DropPolicy::MustNotDropItems {
            assert!(
                self.is_empty(),
                "dropped a GrowableArray<{}> with {} elements while the drop policy forbids dropping elements",
                type_name::<T>(),
                self.len
            );
        }

        self.clear();
    }
}

impl<T: fmt::Debug, A: AllocationStrategy> fmt::Debug for GrowableArray<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SAFETY: The slots `0..len` hold live values.
        let elements = unsafe { self.block.as_slice(self.len) };

        f.debug_struct(type_name::<Self>())
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("drop_policy", &self.drop_policy)
            .field("elements", &elements)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    clippy::cast_possible_truncation,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Arc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};
    use testing::{Lifecycle, Tracked};

    use super::*;
    use crate::TrackingStrategy;

    assert_impl_all!(GrowableArray<u32>: Send, Sync);
    assert_impl_all!(GrowableArray<String, &'static TrackingStrategy>: Send, Sync);
    assert_not_impl_any!(GrowableArray<Cell<u32>>: Sync);
    assert_not_impl_any!(GrowableArray<std::rc::Rc<u32>>: Send, Sync);

    fn contents<T: Clone, A: AllocationStrategy>(array: &GrowableArray<T, A>) -> Vec<T> {
        (0..array.len())
            .map(|index| array.at(index).unwrap().clone())
            .collect()
    }

    #[test]
    fn smoke_test() {
        let mut array = GrowableArray::new().unwrap();

        assert!(array.is_empty());
        assert_eq!(array.capacity(), DEFAULT_CAPACITY.get());

        array.append("Hello".to_string()).unwrap();
        array.append("World".to_string()).unwrap();

        assert_eq!(array.len(), 2);
        assert!(!array.is_empty());
        assert_eq!(array.at(0).unwrap(), "Hello");
        assert_eq!(array.at(1).unwrap(), "World");

        array.at_mut(1).unwrap().push('!');
        assert_eq!(array.at(1).unwrap(), "World!");

        array.remove_last();
        assert_eq!(contents(&array), ["Hello"]);
    }

    #[test]
    fn growth_sequence_follows_early_trigger() {
        // This tests a specific growth policy. Expect to update this test whenever it changes.
        let mut array = GrowableArray::new().unwrap();
        let mut capacities = vec![array.capacity()];

        for value in [10, 20, 30, 40] {
            array.append(value).unwrap();
            capacities.push(array.capacity());
        }

        assert_eq!(capacities, [1, 3, 9, 9, 27]);
        assert_eq!(array.len(), 4);
        assert_eq!(*array.at(0).unwrap(), 10);
        assert_eq!(*array.at(3).unwrap(), 40);
    }

    #[test]
    fn growth_from_zero_capacity() {
        let mut array = GrowableArray::with_capacity(0).unwrap();
        assert_eq!(array.capacity(), 0);

        array.append(1_u8).unwrap();
        assert_eq!(array.capacity(), 3);
    }

    #[test]
    fn explicit_capacity_holds_until_growth() {
        let mut array = GrowableArray::with_capacity(12).unwrap();

        // 12 / 3 = 4, so four appends fit before the early trigger fires.
        for value in 0..4 {
            array.append(value).unwrap();
            assert_eq!(array.capacity(), 12);
        }

        array.append(4).unwrap();
        assert_eq!(array.capacity(), 36);
        assert_eq!(contents(&array), [0, 1, 2, 3, 4]);
    }

    #[test]
    fn capacity_never_below_len() {
        let mut array = GrowableArray::with_capacity(2).unwrap();

        for value in 0..500_u32 {
            array.append(value).unwrap();
            assert!(array.capacity() >= array.len());
        }

        for _ in 0..250 {
            array.remove_last();
            assert!(array.capacity() >= array.len());
        }

        array.shrink_to_fit().unwrap();
        assert_eq!(array.capacity(), 250);
        assert_eq!(contents(&array), (0..250).collect::<Vec<_>>());
    }

    #[test]
    fn at_rejects_index_at_or_beyond_len() {
        let mut array = GrowableArray::with_capacity(10).unwrap();
        array.append('x').unwrap();
        array.append('y').unwrap();

        assert_eq!(*array.at(1).unwrap(), 'y');
        assert!(matches!(
            array.at(2),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(matches!(
            array.at_mut(9),
            Err(Error::IndexOutOfRange { index: 9, len: 2 })
        ));
        assert!(array.at(usize::MAX).is_err());
    }

    #[test]
    fn at_on_empty_array_fails() {
        let array = GrowableArray::<u32>::empty();

        assert!(matches!(
            array.at(0),
            Err(Error::IndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn reserve_zero_is_noop() {
        let tracking = TrackingStrategy::heap();
        // 9 / 3 = 3, so two appends do not trigger growth.
        let mut array = GrowableArray::with_capacity_in(9, &tracking).unwrap();
        array.append(7).unwrap();
        array.append(8).unwrap();
        assert_eq!(array.capacity(), 9);

        array.reserve(0).unwrap();

        assert_eq!(array.len(), 2);
        assert_eq!(array.capacity(), 9);
        assert_eq!(contents(&array), [7, 8]);
        assert_eq!(tracking.allocations(), 1);
    }

    #[test]
    fn reserve_sets_exact_capacity() {
        let mut array = GrowableArray::new().unwrap();
        array.append(1).unwrap();

        array.reserve(50).unwrap();
        assert_eq!(array.capacity(), 50);

        array.reserve(20).unwrap();
        assert_eq!(array.capacity(), 20);
        assert_eq!(contents(&array), [1]);
    }

    #[test]
    fn reserve_below_len_truncates_in_index_order() {
        let lifecycle = Arc::new(Lifecycle::new());
        let mut array = GrowableArray::with_capacity(8).unwrap();

        for value in 0..5 {
            array.append(Tracked::new(value, &lifecycle)).unwrap();
        }

        array.reserve(2).unwrap();

        assert_eq!(array.len(), 2);
        assert_eq!(array.capacity(), 2);
        assert_eq!(array.at(1).unwrap().value(), 1);
        assert_eq!(lifecycle.drop_log(), [2, 3, 4]);
        assert_eq!(lifecycle.live(), 2);
    }

    #[test]
    fn reserve_failure_leaves_array_untouched() {
        let tracking = TrackingStrategy::heap();
        let mut array = GrowableArray::with_capacity_in(3, &tracking).unwrap();
        array.append(1_u64).unwrap();

        tracking.fail_next_allocation();
        let result = array.reserve(100);

        assert!(matches!(
            result,
            Err(Error::AllocationFailure {
                capacity: 100,
                element_size: 8
            })
        ));
        assert_eq!(array.capacity(), 3);
        assert_eq!(contents(&array), [1]);
        assert_eq!(tracking.live_blocks(), 1);
    }

    #[test]
    fn append_failure_leaves_array_untouched() {
        let tracking = TrackingStrategy::heap();
        let mut array = GrowableArray::with_capacity_in(3, &tracking).unwrap();
        array.append(1_u32).unwrap();

        // 3 / 3 <= 1, so the next append needs to grow first.
        tracking.fail_next_allocation();
        assert!(array.append(2).is_err());

        assert_eq!(array.len(), 1);
        assert_eq!(array.capacity(), 3);
        assert_eq!(contents(&array), [1]);

        // The strategy recovers, and so does the array.
        array.append(2).unwrap();
        assert_eq!(contents(&array), [1, 2]);
        assert_eq!(array.capacity(), 9);
    }

    #[test]
    fn emplace_does_not_construct_when_growth_fails() {
        let tracking = TrackingStrategy::heap();
        let mut array = GrowableArray::<String, _>::with_capacity_in(1, &tracking).unwrap();
        let constructed = Cell::new(false);

        tracking.fail_next_allocation();
        let result = array.emplace(|| {
            constructed.set(true);
            String::new()
        });

        assert!(result.is_err());
        assert!(!constructed.get());
        assert!(array.is_empty());
    }

    #[test]
    fn emplace_returns_new_element() {
        let mut array = GrowableArray::new().unwrap();
        array.append(vec![1]).unwrap();

        let element = array.emplace(|| vec![2, 3]).unwrap();
        element.push(4);

        assert_eq!(array.len(), 2);
        assert_eq!(array.at(1).unwrap(), &[2, 3, 4]);
    }

    #[test]
    #[should_panic]
    fn remove_last_on_empty_panics() {
        let mut array = GrowableArray::<u32>::new().unwrap();
        array.remove_last();
    }

    #[test]
    fn remove_last_destroys_only_last() {
        let lifecycle = Arc::new(Lifecycle::new());
        let mut array = GrowableArray::new().unwrap();

        for value in 0..3 {
            array.append(Tracked::new(value, &lifecycle)).unwrap();
        }

        array.remove_last();

        assert_eq!(lifecycle.drop_log(), [2]);
        assert_eq!(array.len(), 2);
        assert_eq!(array.at(1).unwrap().value(), 1);
    }

    #[test]
    fn resize_fills_with_clones() {
        let mut array = GrowableArray::empty();
        array.resize(5, 99).unwrap();

        assert_eq!(array.len(), 5);
        assert_eq!(contents(&array), [99; 5]);
    }

    #[test]
    fn resize_keeps_existing_elements() {
        let mut array = GrowableArray::with_capacity(10).unwrap();
        array.append(1).unwrap();
        array.append(2).unwrap();

        array.resize(4, 0).unwrap();

        // Enough capacity was available, so no reallocation was needed.
        assert_eq!(array.capacity(), 10);
        assert_eq!(contents(&array), [1, 2, 0, 0]);
    }

    #[test]
    fn resize_never_shrinks() {
        let lifecycle = Arc::new(Lifecycle::new());
        let mut array = GrowableArray::new().unwrap();

        for value in 0..3 {
            array.append(Tracked::new(value, &lifecycle)).unwrap();
        }

        array.resize(1, Tracked::new(100, &lifecycle)).unwrap();

        assert_eq!(array.len(), 3);
        // Only the unused fill value was dropped.
        assert_eq!(lifecycle.drop_log(), [100]);
    }

    #[test]
    fn resize_default_uses_default_values() {
        let mut array = GrowableArray::<String>::new().unwrap();
        array.append("first".to_string()).unwrap();

        array.resize_default(3).unwrap();

        assert_eq!(contents(&array), ["first", "", ""]);
    }

    #[test]
    fn resize_with_panicking_clone_keeps_built_elements() {
        let lifecycle = Arc::new(Lifecycle::new());
        let mut array = GrowableArray::new().unwrap();
        array.append(Tracked::new(0, &lifecycle)).unwrap();

        lifecycle.panic_on_clone_number(3);
        let fill = Tracked::new(7, &lifecycle);

        let result = panic::catch_unwind(AssertUnwindSafe(|| array.resize(6, fill)));
        assert!(result.is_err());

        // Two clones succeeded before the third one panicked.
        assert_eq!(array.len(), 3);
        assert_eq!(array.at(2).unwrap().value(), 7);

        drop(array);
        assert_eq!(lifecycle.live(), 0);
    }

    #[test]
    fn clear_releases_storage() {
        let tracking = TrackingStrategy::heap();
        let lifecycle = Arc::new(Lifecycle::new());
        let mut array = GrowableArray::new_in(&tracking).unwrap();

        for value in 0..4 {
            array.append(Tracked::new(value, &lifecycle)).unwrap();
        }

        array.clear();

        assert_eq!(array.len(), 0);
        assert_eq!(array.capacity(), 0);
        assert_eq!(tracking.live_blocks(), 0);
        assert_eq!(lifecycle.drop_log(), [0, 1, 2, 3]);

        // A cleared array is reusable.
        array.append(Tracked::new(9, &lifecycle)).unwrap();
        assert_eq!(array.capacity(), 3);
    }

    #[test]
    fn drop_destroys_in_index_order_and_releases_full_capacity() {
        let tracking = TrackingStrategy::heap();
        let lifecycle = Arc::new(Lifecycle::new());

        {
            let mut array = GrowableArray::with_capacity_in(10, &tracking).unwrap();

            for value in 0..3 {
                array.append(Tracked::new(value, &lifecycle)).unwrap();
            }
        }

        assert_eq!(lifecycle.drop_log(), [0, 1, 2]);
        // The tracking strategy would have panicked if the release used a different layout.
        assert_eq!(tracking.live_blocks(), 0);
        assert_eq!(tracking.deallocations(), 1);
    }

    #[test]
    fn dropping_zero_capacity_array_does_not_deallocate() {
        let tracking = TrackingStrategy::heap();

        drop(GrowableArray::<u64, _>::with_capacity_in(0, &tracking).unwrap());

        assert_eq!(tracking.allocations(), 0);
        assert_eq!(tracking.deallocations(), 0);
    }

    #[test]
    fn clone_is_independent() {
        let mut original = GrowableArray::with_capacity(7).unwrap();
        original.append(vec![1]).unwrap();
        original.append(vec![2]).unwrap();

        let mut copy = original.clone();

        assert_eq!(copy.len(), 2);
        assert_eq!(copy.capacity(), 7);

        copy.at_mut(0).unwrap().push(100);
        original.at_mut(1).unwrap().push(200);

        assert_eq!(contents(&original), [vec![1], vec![2, 200]]);
        assert_eq!(contents(&copy), [vec![1, 100], vec![2]]);
    }

    #[test]
    fn clone_from_replaces_previous_contents() {
        let tracking = TrackingStrategy::heap();
        let lifecycle = Arc::new(Lifecycle::new());

        let mut source = GrowableArray::with_capacity_in(4, &tracking).unwrap();
        source.append(Tracked::new(1, &lifecycle)).unwrap();

        let mut destination = GrowableArray::with_capacity_in(20, &tracking).unwrap();
        destination.append(Tracked::new(50, &lifecycle)).unwrap();
        destination.append(Tracked::new(51, &lifecycle)).unwrap();

        destination.clone_from(&source);

        assert_eq!(destination.len(), 1);
        assert_eq!(destination.capacity(), 4);
        assert_eq!(destination.at(0).unwrap().value(), 1);
        assert_eq!(lifecycle.drop_log(), [50, 51]);
        assert_eq!(tracking.live_blocks(), 2);
    }

    #[test]
    fn try_clone_failure_reports_allocation_failure() {
        let tracking = TrackingStrategy::heap();
        let mut array = GrowableArray::with_capacity_in(4, &tracking).unwrap();
        array.append(5_u16).unwrap();

        tracking.fail_next_allocation();

        assert!(matches!(
            array.try_clone(),
            Err(Error::AllocationFailure { capacity: 4, .. })
        ));
        assert_eq!(tracking.live_blocks(), 1);
    }

    #[test]
    fn try_clone_from_failure_leaves_destination_unchanged() {
        let tracking = TrackingStrategy::heap();

        let mut source = GrowableArray::with_capacity_in(4, &tracking).unwrap();
        source.append(1_u32).unwrap();

        // 2 / 3 = 0, so the first append already grows the destination to 6 slots.
        let mut destination = GrowableArray::with_capacity_in(2, &tracking).unwrap();
        destination.append(2_u32).unwrap();
        assert_eq!(destination.capacity(), 6);

        tracking.fail_next_allocation();
        assert!(destination.try_clone_from(&source).is_err());

        assert_eq!(contents(&destination), [2]);
        assert_eq!(destination.capacity(), 6);
    }

    #[test]
    fn panicking_clone_tears_down_partial_copy() {
        let tracking = TrackingStrategy::heap();
        let lifecycle = Arc::new(Lifecycle::new());

        let mut original = GrowableArray::with_capacity_in(5, &tracking).unwrap();
        for value in 0..4 {
            original.append(Tracked::new(value, &lifecycle)).unwrap();
        }

        lifecycle.panic_on_clone_number(3);

        let result = panic::catch_unwind(AssertUnwindSafe(|| original.clone()));
        assert!(result.is_err());

        // The two successful clones were destroyed in index order and the partial block is gone.
        assert_eq!(lifecycle.drop_log(), [0, 1]);
        assert_eq!(tracking.live_blocks(), 1);
        assert_eq!(original.len(), 4);
        assert_eq!(lifecycle.live(), 4);
    }

    #[test]
    fn take_leaves_source_empty_and_reusable() {
        let tracking = TrackingStrategy::heap();
        let mut source = GrowableArray::with_capacity_in(9, &tracking).unwrap();
        source.append(1).unwrap();
        source.append(2).unwrap();

        let taken = source.take();

        assert_eq!(contents(&taken), [1, 2]);
        assert_eq!(taken.capacity(), 9);
        assert_eq!(source.len(), 0);
        assert_eq!(source.capacity(), 0);
        // Ownership moved, nothing was reallocated.
        assert_eq!(tracking.allocations(), 1);

        source.append(3).unwrap();
        assert_eq!(source.capacity(), 3);
        assert_eq!(tracking.live_blocks(), 2);
    }

    #[test]
    fn move_from_releases_destination_storage_once() {
        let tracking = TrackingStrategy::heap();
        let lifecycle = Arc::new(Lifecycle::new());

        let mut source = GrowableArray::with_capacity_in(6, &tracking).unwrap();
        source.append(Tracked::new(1, &lifecycle)).unwrap();
        source.append(Tracked::new(2, &lifecycle)).unwrap();

        let mut destination = GrowableArray::with_capacity_in(3, &tracking).unwrap();
        destination.append(Tracked::new(99, &lifecycle)).unwrap();

        destination.move_from(&mut source);

        assert_eq!(lifecycle.drop_log(), [99]);
        assert_eq!(destination.len(), 2);
        assert_eq!(destination.capacity(), 6);
        assert_eq!(destination.at(0).unwrap().value(), 1);
        assert_eq!(source.len(), 0);
        assert_eq!(source.capacity(), 0);
        assert_eq!(tracking.live_blocks(), 1);
        assert_eq!(lifecycle.clones(), 0);

        drop(source);
        drop(destination);

        assert_eq!(tracking.live_blocks(), 0);
        assert_eq!(tracking.allocations(), tracking.deallocations());
    }

    #[test]
    fn move_from_chains() {
        let mut first = GrowableArray::new().unwrap();
        first.append(1).unwrap();
        let mut second = GrowableArray::empty();
        let mut third = GrowableArray::empty();

        third.move_from(second.move_from(&mut first));

        assert_eq!(contents(&third), [1]);
        assert!(first.is_empty() && second.is_empty());
        assert_eq!(second.capacity(), 0);
    }

    #[test]
    fn move_from_exchanges_strategies() {
        let left = TrackingStrategy::heap();
        let right = TrackingStrategy::heap();

        let mut source = GrowableArray::with_capacity_in(2, &left).unwrap();
        source.append(1_u8).unwrap();
        let mut destination = GrowableArray::with_capacity_in(2, &right).unwrap();

        destination.move_from(&mut source);

        assert!(std::ptr::eq(*destination.strategy(), &left));
        assert!(std::ptr::eq(*source.strategy(), &right));

        drop(destination);
        assert_eq!(left.live_blocks(), 0);
        assert_eq!(right.live_blocks(), 0);
    }

    #[test]
    fn zero_sized_elements() {
        let tracking = TrackingStrategy::heap();
        let mut array = GrowableArray::new_in(&tracking).unwrap();

        for _ in 0..100 {
            array.append(()).unwrap();
        }

        assert_eq!(array.len(), 100);
        assert!(array.at(99).is_ok());
        assert_eq!(tracking.allocations(), 0);
    }

    #[test]
    fn max_capacity_is_a_hard_cap() {
        let mut array = GrowableArray::<u64>::empty();

        let result = array.reserve(GrowableArray::<u64>::MAX_CAPACITY + 1);

        assert!(matches!(result, Err(Error::AllocationFailure { .. })));
        assert_eq!(array.capacity(), 0);
    }

    #[test]
    fn zero_sized_elements_reach_max_capacity_without_allocating() {
        let mut array = GrowableArray::<()>::empty();
        array.reserve(usize::MAX).unwrap();

        assert_eq!(array.capacity(), GrowableArray::<()>::MAX_CAPACITY);

        // At the maximum the array no longer grows, it only fills the remaining slots.
        array.append(()).unwrap();
        assert_eq!(array.capacity(), usize::MAX);
        assert_eq!(array.len(), 1);
    }

    #[test]
    #[should_panic]
    fn drop_with_elements_panics_if_policy_must_not_drop() {
        let mut array = GrowableArray::<u32>::builder()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build()
            .unwrap();

        array.append(1).unwrap();
    }

    #[test]
    fn drop_without_elements_is_fine_if_policy_must_not_drop() {
        let mut array = GrowableArray::<u32>::builder()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build()
            .unwrap();

        array.append(1).unwrap();
        array.remove_last();
    }

    #[test]
    fn panic_with_live_elements_does_not_abort_if_policy_must_not_drop() {
        let lifecycle = Arc::new(Lifecycle::new());

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut array = GrowableArray::builder()
                .drop_policy(DropPolicy::MustNotDropItems)
                .build()
                .unwrap();

            array.append(Tracked::new(1, &lifecycle)).unwrap();

            panic!("unrelated failure while the array is in use");
        }));

        assert!(result.is_err());

        // The elements are still destroyed during unwinding.
        assert_eq!(lifecycle.drop_log(), [1]);
        assert_eq!(lifecycle.live(), 0);
    }

    #[test]
    fn shrink_to_fit_on_empty_array_keeps_storage() {
        let tracking = TrackingStrategy::heap();
        let mut array = GrowableArray::<u32, _>::with_capacity_in(10, &tracking).unwrap();

        // Equivalent to `reserve(0)`, which never releases storage.
        array.shrink_to_fit().unwrap();

        assert_eq!(array.len(), 0);
        assert_eq!(array.capacity(), 10);
        assert_eq!(tracking.allocations(), 1);
        assert_eq!(tracking.live_blocks(), 1);

        // `clear()` is the way to release the storage of an empty array.
        array.clear();
        assert_eq!(array.capacity(), 0);
        assert_eq!(tracking.live_blocks(), 0);
    }

    #[test]
    fn debug_lists_elements() {
        let mut array = GrowableArray::with_capacity(9).unwrap();
        array.append(3).unwrap();
        array.append(4).unwrap();

        let output = format!("{array:?}");

        assert!(output.contains("len: 2"));
        assert!(output.contains("capacity: 9"));
        assert!(output.contains("[3, 4]"));
    }
}
