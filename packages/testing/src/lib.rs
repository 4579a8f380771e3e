#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in growable array packages.
//!
//! The central piece is [`Tracked`], an element type that reports every construction, clone
//! and destruction to a shared [`Lifecycle`]. Containers under test hold `Tracked` values and
//! the test then asserts on the lifecycle: how many values are alive, how often they were
//! cloned and in which order they were destroyed.

use std::sync::atomic::{self, AtomicUsize};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

const ERR_POISONED_LOCK: &str = "lifecycle drop log lock poisoned - a previous operation panicked while holding it";

/// Shared record of the lifecycle events of a family of [`Tracked`] values.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use testing::{Lifecycle, Tracked};
///
/// let lifecycle = Arc::new(Lifecycle::new());
///
/// let first = Tracked::new(1, &lifecycle);
/// let second = first.clone();
/// assert_eq!(lifecycle.live(), 2);
///
/// drop(second);
/// drop(first);
///
/// assert_eq!(lifecycle.live(), 0);
/// assert_eq!(lifecycle.drop_log(), [1, 1]);
/// ```
#[derive(Debug, Default)]
pub struct Lifecycle {
    created: AtomicUsize,
    cloned: AtomicUsize,
    dropped: AtomicUsize,

    /// Number of clone attempts so far, including any that panicked.
    clone_attempts: AtomicUsize,

    /// If non-zero, the clone attempt with this ordinal (1-based) panics.
    panic_on_clone: AtomicUsize,

    /// Values of the dropped instances, in the order they were dropped.
    drop_log: Mutex<Vec<u32>>,
}

impl Lifecycle {
    /// Creates a lifecycle with no recorded events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `ordinal`-th clone attempt from now on (counting from 1) panic.
    ///
    /// The panicking attempt does not create a value. Later attempts succeed again.
    pub fn panic_on_clone_number(&self, ordinal: usize) {
        let target = self
            .clone_attempts
            .load(atomic::Ordering::Relaxed)
            .wrapping_add(ordinal);

        self.panic_on_clone.store(target, atomic::Ordering::Relaxed);
    }

    /// Number of values created via [`Tracked::new()`].
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(atomic::Ordering::Relaxed)
    }

    /// Number of values created by successful clones.
    #[must_use]
    pub fn clones(&self) -> usize {
        self.cloned.load(atomic::Ordering::Relaxed)
    }

    /// Number of values that have been dropped.
    #[must_use]
    pub fn drops(&self) -> usize {
        self.dropped.load(atomic::Ordering::Relaxed)
    }

    /// Number of values that currently exist.
    #[must_use]
    pub fn live(&self) -> usize {
        self.created()
            .wrapping_add(self.clones())
            .wrapping_sub(self.drops())
    }

    /// The values of all dropped instances, in the order they were dropped.
    #[must_use]
    pub fn drop_log(&self) -> Vec<u32> {
        self.drop_log.lock().expect(ERR_POISONED_LOCK).clone()
    }
}

/// A value that reports its lifecycle events to a [`Lifecycle`].
///
/// Clones carry the same value as the original, which makes it possible to identify them in
/// the drop log.
#[derive(Debug)]
pub struct Tracked {
    value: u32,
    lifecycle: Arc<Lifecycle>,
}

impl Tracked {
    /// Creates a new tracked value, recording the creation in `lifecycle`.
    #[must_use]
    pub fn new(value: u32, lifecycle: &Arc<Lifecycle>) -> Self {
        lifecycle.created.fetch_add(1, atomic::Ordering::Relaxed);

        Self {
            value,
            lifecycle: Arc::clone(lifecycle),
        }
    }

    /// The value this instance was created with.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.value
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        let attempt = self
            .lifecycle
            .clone_attempts
            .fetch_add(1, atomic::Ordering::Relaxed)
            .wrapping_add(1);

        if attempt == self.lifecycle.panic_on_clone.load(atomic::Ordering::Relaxed) {
            panic!(
                "clone attempt {attempt} of tracked value {} panicked on request",
                self.value
            );
        }

        self.lifecycle.cloned.fetch_add(1, atomic::Ordering::Relaxed);

        Self {
            value: self.value,
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        trace!(value = self.value, "dropping tracked value");

        self.lifecycle.dropped.fetch_add(1, atomic::Ordering::Relaxed);

        // Recording the drop must not panic, so a poisoned log is still appended to.
        let mut log = self
            .lifecycle
            .drop_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        log.push(self.value);
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Tracked: Send, Sync, Clone);

    #[test]
    fn counts_creations_clones_and_drops() {
        let lifecycle = Arc::new(Lifecycle::new());

        let first = Tracked::new(5, &lifecycle);
        let second = Tracked::new(6, &lifecycle);
        let copy = second.clone();

        assert_eq!(lifecycle.created(), 2);
        assert_eq!(lifecycle.clones(), 1);
        assert_eq!(lifecycle.live(), 3);
        assert_eq!(copy.value(), 6);

        drop(second);
        drop(first);
        drop(copy);

        assert_eq!(lifecycle.drops(), 3);
        assert_eq!(lifecycle.drop_log(), [6, 5, 6]);
    }

    #[test]
    fn requested_clone_panics_once() {
        let lifecycle = Arc::new(Lifecycle::new());
        let original = Tracked::new(1, &lifecycle);

        lifecycle.panic_on_clone_number(2);

        let first = original.clone();
        assert!(panic::catch_unwind(AssertUnwindSafe(|| original.clone())).is_err());
        let third = original.clone();

        assert_eq!(lifecycle.clones(), 2);
        assert_eq!(lifecycle.live(), 3);

        drop((first, third));
    }
}
