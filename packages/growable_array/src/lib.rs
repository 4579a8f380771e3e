#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A contiguous growable array that manages its own storage through a pluggable allocation
//! strategy.
//!
//! This crate provides [`GrowableArray`], a sequence container that keeps its elements in a
//! single block of memory. Unlike [`Vec`], the storage engine is explicit: the array obtains
//! raw blocks from an [`AllocationStrategy`], places values into them itself and returns the
//! blocks to the same strategy when it is done with them.
//!
//! # Key Features
//!
//! - **Pluggable allocation**: memory comes from any [`AllocationStrategy`], with [`Heap`] as
//!   the default and [`TrackingStrategy`] for leak checks and exhaustion testing
//! - **Early growth**: the capacity triples once the length reaches a third of it
//! - **Fallible operations**: allocation failures are reported as [`Error::AllocationFailure`]
//!   and leave the array exactly as it was
//! - **Checked access**: [`at()`][GrowableArray::at] only addresses live elements
//! - **Explicit ownership transfer**: [`take()`][GrowableArray::take] and
//!   [`move_from()`][GrowableArray::move_from] leave the source empty and reusable
//! - **Drop policies**: optionally assert that the array is empty when dropped
//!
//! # Examples
//!
//! ```rust
//! use growable_array::GrowableArray;
//!
//! let mut array = GrowableArray::new()?;
//!
//! for value in [10, 20, 30, 40] {
//!     array.append(value)?;
//! }
//!
//! assert_eq!(array.len(), 4);
//! assert_eq!(array.capacity(), 27);
//! assert_eq!(*array.at(3)?, 40);
//!
//! array.remove_last();
//! array.shrink_to_fit()?;
//! assert_eq!(array.capacity(), 3);
//! # Ok::<(), growable_array::Error>(())
//! ```
//!
//! # Custom allocation strategies
//!
//! ```rust
//! use growable_array::{Error, GrowableArray, TrackingStrategy};
//!
//! // Allow at most 64 bytes of live storage.
//! let tracking = TrackingStrategy::heap().with_byte_limit(64);
//! let mut array = GrowableArray::<u64, _>::new_in(&tracking)?;
//!
//! array.append(1)?; // Grows to 3 slots (24 bytes).
//!
//! // Growing to 9 slots would need 72 bytes.
//! assert!(matches!(
//!     array.append(2),
//!     Err(Error::AllocationFailure { capacity: 9, .. })
//! ));
//!
//! // The failed append did not change the array.
//! assert_eq!(array.len(), 1);
//! assert_eq!(array.capacity(), 3);
//! # Ok::<(), growable_array::Error>(())
//! ```

mod array;
mod block;
mod builder;
mod drop_policy;
mod error;
mod growth;
mod strategy;
mod tracking;

pub use array::*;
pub(crate) use block::*;
pub use builder::*;
pub use drop_policy::*;
pub use error::*;
pub use growth::GROWTH_FACTOR;
pub use strategy::*;
pub use tracking::*;
