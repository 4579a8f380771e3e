use thiserror::Error;

/// Errors that can occur when operating on a [`GrowableArray`][crate::GrowableArray].
///
/// Neither error leaves the array in a modified state. Contract violations such as calling
/// [`remove_last()`][crate::GrowableArray::remove_last] on an empty array are not reported
/// through this type - they panic.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller tried to access an element at an index that does not hold a live element.
    ///
    /// Only live elements are addressable, so the bound is the length, not the capacity.
    #[error("index {index} is out of range for a growable array of length {len}")]
    IndexOutOfRange {
        /// The index that was requested.
        index: usize,

        /// The number of live elements at the time of the request.
        len: usize,
    },

    /// The allocation strategy could not provide a block for the requested number of slots.
    ///
    /// This is also reported when the requested block would exceed the size of virtual memory
    /// or when the array has already reached its maximum capacity.
    #[error(
        "could not obtain storage for {capacity} slots of {element_size} bytes from the allocation strategy"
    )]
    AllocationFailure {
        /// The number of element slots that were requested.
        capacity: usize,

        /// The size in bytes of a single element slot.
        element_size: usize,
    },
}

/// A specialized `Result` type for growable array operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn index_out_of_range_names_index_and_len() {
        let error = Error::IndexOutOfRange { index: 7, len: 3 };

        assert_eq!(
            error.to_string(),
            "index 7 is out of range for a growable array of length 3"
        );
    }

    #[test]
    fn allocation_failure_names_request() {
        let error = Error::AllocationFailure {
            capacity: 27,
            element_size: 8,
        };

        let message = error.to_string();
        assert!(message.contains("27 slots"));
        assert!(message.contains("8 bytes"));
    }
}
