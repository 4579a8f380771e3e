use std::alloc::Layout;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Mutex;
use std::sync::atomic::{self, AtomicBool};

use tracing::{debug, trace};

use crate::{AllocationStrategy, Heap};

const ERR_POISONED_LOCK: &str = "tracking strategy ledger lock poisoned - a previous operation panicked while holding it";

/// An allocation strategy that wraps another strategy and keeps a ledger of its blocks.
///
/// The ledger records every outstanding block together with the layout it was allocated
/// with. Deallocating a block that is not outstanding, or deallocating it with a different
/// layout, is a bug in the caller and panics. This makes the strategy a convenient oracle
/// for leak and double-release checks in tests.
///
/// The strategy can also simulate exhaustion, either through a byte limit on live memory or
/// by refusing the next allocation request.
///
/// Share one tracking strategy between several arrays by passing a reference to it, because
/// `&S` is itself an allocation strategy.
///
/// # Examples
///
/// ```
/// use growable_array::{GrowableArray, TrackingStrategy};
///
/// let tracking = TrackingStrategy::heap();
///
/// {
///     let mut array = GrowableArray::new_in(&tracking).unwrap();
///     array.append(1_u64).unwrap();
///     array.append(2_u64).unwrap();
///
///     assert_eq!(tracking.live_blocks(), 1);
/// }
///
/// // Every block was returned to the strategy when the array was dropped.
/// assert_eq!(tracking.live_blocks(), 0);
/// assert_eq!(tracking.allocations(), tracking.deallocations());
/// ```
#[derive(Debug)]
pub struct TrackingStrategy<S = Heap> {
    inner: S,

    /// Upper bound on the total size of live blocks. Requests that would exceed it are refused.
    byte_limit: Option<usize>,

    /// One-shot switch that makes the next allocation request fail.
    fail_next: AtomicBool,

    ledger: Mutex<Ledger>,
}

#[derive(Debug, Default)]
struct Ledger {
    /// Outstanding blocks, keyed by address.
    outstanding: HashMap<usize, Layout>,
    live_bytes: usize,
    allocations: usize,
    deallocations: usize,
    refusals: usize,
}

impl TrackingStrategy<Heap> {
    /// Creates a tracking strategy that obtains its blocks from the global allocator.
    #[must_use]
    pub fn heap() -> Self {
        Self::new(Heap)
    }
}

impl<S: AllocationStrategy> TrackingStrategy<S> {
    /// Creates a tracking strategy that obtains its blocks from `inner`.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            byte_limit: None,
            fail_next: AtomicBool::new(false),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Limits the total size of live blocks to `limit` bytes.
    ///
    /// Any allocation request that would push the live total above the limit is refused.
    #[must_use]
    pub fn with_byte_limit(mut self, limit: usize) -> Self {
        self.byte_limit = Some(limit);
        self
    }

    /// Makes the next allocation request fail, regardless of the byte limit.
    ///
    /// The switch resets itself after refusing one request.
    pub fn fail_next_allocation(&self) {
        self.fail_next.store(true, atomic::Ordering::Relaxed);
    }

    /// The number of blocks that have been allocated and not yet deallocated.
    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.ledger.lock().expect(ERR_POISONED_LOCK).outstanding.len()
    }

    /// The total size in bytes of all blocks that have not yet been deallocated.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.ledger.lock().expect(ERR_POISONED_LOCK).live_bytes
    }

    /// The number of successful allocations over the lifetime of the strategy.
    #[must_use]
    pub fn allocations(&self) -> usize {
        self.ledger.lock().expect(ERR_POISONED_LOCK).allocations
    }

    /// The number of deallocations over the lifetime of the strategy.
    #[must_use]
    pub fn deallocations(&self) -> usize {
        self.ledger.lock().expect(ERR_POISONED_LOCK).deallocations
    }

    /// The number of allocation requests that were refused.
    #[must_use]
    pub fn refusals(&self) -> usize {
        self.ledger.lock().expect(ERR_POISONED_LOCK).refusals
    }

    /// The layout of the outstanding block at `ptr`, if there is one.
    #[must_use]
    pub fn outstanding_layout(&self, ptr: NonNull<u8>) -> Option<Layout> {
        self.ledger
            .lock()
            .expect(ERR_POISONED_LOCK)
            .outstanding
            .get(&ptr.as_ptr().addr())
            .copied()
    }
}

// SAFETY: Blocks come from the inner strategy, which upholds the trait requirements. The
// ledger only observes them and never hands out a block twice.
unsafe impl<S: AllocationStrategy> AllocationStrategy for TrackingStrategy<S> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let mut ledger = self.ledger.lock().expect(ERR_POISONED_LOCK);

        if self.fail_next.swap(false, atomic::Ordering::Relaxed) {
            debug!(size = layout.size(), "refusing allocation: fail-next switch was set");
            ledger.refusals = ledger.refusals.wrapping_add(1);
            return None;
        }

        if let Some(limit) = self.byte_limit {
            if ledger.live_bytes.saturating_add(layout.size()) > limit {
                debug!(
                    size = layout.size(),
                    live_bytes = ledger.live_bytes,
                    limit,
                    "refusing allocation: byte limit would be exceeded"
                );
                ledger.refusals = ledger.refusals.wrapping_add(1);
                return None;
            }
        }

        let Some(ptr) = self.inner.allocate(layout) else {
            ledger.refusals = ledger.refusals.wrapping_add(1);
            return None;
        };

        let previous = ledger.outstanding.insert(ptr.as_ptr().addr(), layout);
        assert!(
            previous.is_none(),
            "inner strategy returned block {ptr:?} which is already outstanding"
        );

        // Cannot overflow because the live blocks fit into virtual memory.
        ledger.live_bytes = ledger.live_bytes.wrapping_add(layout.size());
        ledger.allocations = ledger.allocations.wrapping_add(1);

        trace!(?ptr, size = layout.size(), align = layout.align(), "allocated block");

        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let mut ledger = self.ledger.lock().expect(ERR_POISONED_LOCK);

        let Some(allocated_layout) = ledger.outstanding.remove(&ptr.as_ptr().addr()) else {
            drop(ledger);
            panic!("deallocating block {ptr:?} which is not outstanding");
        };

        if allocated_layout != layout {
            drop(ledger);
            panic!(
                "deallocating block {ptr:?} with layout {layout:?} but it was allocated with {allocated_layout:?}"
            );
        }

        // Cannot underflow because the block was counted when it was allocated.
        ledger.live_bytes = ledger.live_bytes.wrapping_sub(layout.size());
        ledger.deallocations = ledger.deallocations.wrapping_add(1);
        drop(ledger);

        trace!(?ptr, size = layout.size(), "deallocated block");

        // SAFETY: The ledger confirmed that the block is outstanding with this layout, so it
        // came from the inner strategy's `allocate()` and was not yet deallocated.
        unsafe { self.inner.deallocate(ptr, layout) }
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

    assert_impl_all!(TrackingStrategy: AllocationStrategy, Send, Sync);

    #[test]
    fn counts_blocks_and_bytes() {
        let tracking = TrackingStrategy::heap();
        let small = Layout::array::<u32>(2).unwrap();
        let large = Layout::array::<u32>(10).unwrap();

        let first = tracking.allocate(small).unwrap();
        let second = tracking.allocate(large).unwrap();

        assert_eq!(tracking.live_blocks(), 2);
        assert_eq!(tracking.live_bytes(), 48);
        assert_eq!(tracking.outstanding_layout(second), Some(large));

        unsafe { tracking.deallocate(first, small) };

        assert_eq!(tracking.live_blocks(), 1);
        assert_eq!(tracking.live_bytes(), 40);
        assert_eq!(tracking.outstanding_layout(first), None);

        unsafe { tracking.deallocate(second, large) };

        assert_eq!(tracking.allocations(), 2);
        assert_eq!(tracking.deallocations(), 2);
        assert_eq!(tracking.live_bytes(), 0);
    }

    #[test]
    fn byte_limit_refuses_oversized_requests() {
        let tracking = TrackingStrategy::heap().with_byte_limit(16);

        assert!(tracking.allocate(Layout::array::<u8>(17).unwrap()).is_none());
        assert_eq!(tracking.refusals(), 1);

        let layout = Layout::array::<u8>(16).unwrap();
        let ptr = tracking.allocate(layout).unwrap();

        // The limit applies to live bytes, so a second block does not fit.
        assert!(tracking.allocate(Layout::new::<u8>()).is_none());
        assert_eq!(tracking.refusals(), 2);

        unsafe { tracking.deallocate(ptr, layout) };
    }

    #[test]
    fn fail_next_refuses_exactly_one_request() {
        let tracking = TrackingStrategy::heap();
        let layout = Layout::new::<u64>();

        tracking.fail_next_allocation();
        assert!(tracking.allocate(layout).is_none());

        let ptr = tracking.allocate(layout).unwrap();
        unsafe { tracking.deallocate(ptr, layout) };

        assert_eq!(tracking.refusals(), 1);
        assert_eq!(tracking.allocations(), 1);
    }

    #[test]
    #[should_panic]
    fn deallocate_with_wrong_layout_panics() {
        let tracking = TrackingStrategy::heap();
        let ptr = tracking.allocate(Layout::array::<u64>(3).unwrap()).unwrap();

        unsafe { tracking.deallocate(ptr, Layout::array::<u64>(2).unwrap()) };
    }

    #[test]
    #[should_panic]
    fn double_deallocate_panics() {
        let tracking = TrackingStrategy::heap();
        let layout = Layout::new::<u64>();
        let ptr = tracking.allocate(layout).unwrap();

        unsafe {
            tracking.deallocate(ptr, layout);
            tracking.deallocate(ptr, layout);
        }
    }
}
