/// Determines element dropping behavior when a [`GrowableArray`][crate::GrowableArray] is dropped.
///
/// By default, the array destroys its remaining elements when it is dropped.
///
/// # Examples
///
/// ```
/// use growable_array::{DropPolicy, GrowableArray};
///
/// // The drop policy is set at construction time.
/// let mut array = GrowableArray::<u32>::builder()
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build()
///     .unwrap();
///
/// array.append(5).unwrap();
///
/// // The array must be emptied before it goes out of scope.
/// array.clear();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The array will destroy its elements when the array is dropped. This is the default.
    #[default]
    MayDropItems,

    /// The array will panic if it still contains elements when it is dropped.
    ///
    /// This may be valuable if the elements must be consumed through some other path (e.g.
    /// handed back to their owner one by one) and silently destroying them would be a bug.
    MustNotDropItems,
}
