//! Integration tests for the behavior of `GrowableArray` when its allocation strategy runs out
//! of memory.
//!
//! Every failed operation must report `Error::AllocationFailure` and leave the array exactly as
//! it was before the call.

use growable_array::{AllocationStrategy, Error, GrowableArray, TrackingStrategy};

fn snapshot<A: AllocationStrategy>(array: &GrowableArray<u64, A>) -> (usize, usize, Vec<u64>) {
    let elements = (0..array.len())
        .map(|index| *array.at(index).unwrap())
        .collect();

    (array.len(), array.capacity(), elements)
}

#[test]
fn construction_fails_when_strategy_is_exhausted() {
    let tracking = TrackingStrategy::heap().with_byte_limit(0);

    assert!(matches!(
        GrowableArray::<u64, _>::new_in(&tracking),
        Err(Error::AllocationFailure {
            capacity: 1,
            element_size: 8
        })
    ));

    // Zero capacity never reaches the strategy.
    let array = GrowableArray::<u64, _>::with_capacity_in(0, &tracking).unwrap();
    assert_eq!(array.capacity(), 0);
}

#[test]
fn append_stops_at_byte_limit_without_corruption() {
    // Room for the block of 27 slots plus the 9-slot block it replaces.
    let tracking = TrackingStrategy::heap().with_byte_limit(36 * 8);
    let mut array = GrowableArray::new_in(&tracking).unwrap();

    let mut appended = 0_u64;
    let error = loop {
        match array.append(appended) {
            Ok(()) => appended += 1,
            Err(error) => break error,
        }
    };

    assert!(matches!(
        error,
        Error::AllocationFailure { capacity: 81, .. }
    ));
    assert_eq!(array.capacity(), 27);
    assert_eq!(array.len(), 9);
    assert_eq!(snapshot(&array).2, (0..9).collect::<Vec<_>>());
    assert_eq!(tracking.live_blocks(), 1);
}

#[test]
fn failed_operations_leave_array_unchanged() {
    let tracking = TrackingStrategy::heap();
    let mut array = GrowableArray::with_capacity_in(3, &tracking).unwrap();
    array.append(11).unwrap();

    let before = snapshot(&array);

    tracking.fail_next_allocation();
    assert!(array.append(12).is_err());
    assert_eq!(snapshot(&array), before);

    tracking.fail_next_allocation();
    assert!(array.emplace(|| 12).is_err());
    assert_eq!(snapshot(&array), before);

    tracking.fail_next_allocation();
    assert!(array.reserve(10).is_err());
    assert_eq!(snapshot(&array), before);

    tracking.fail_next_allocation();
    assert!(array.resize(10, 0).is_err());
    assert_eq!(snapshot(&array), before);

    tracking.fail_next_allocation();
    assert!(array.shrink_to_fit().is_err());
    assert_eq!(snapshot(&array), before);

    let mut destination = GrowableArray::with_capacity_in(2, &tracking).unwrap();
    destination.append(99).unwrap();
    let destination_before = snapshot(&destination);

    tracking.fail_next_allocation();
    assert!(destination.try_clone_from(&array).is_err());
    assert_eq!(snapshot(&destination), destination_before);

    assert_eq!(tracking.refusals(), 6);
}

#[test]
fn exceeding_address_space_is_an_allocation_failure() {
    let mut array = GrowableArray::<u64>::empty();

    assert!(matches!(
        array.reserve(usize::MAX),
        Err(Error::AllocationFailure {
            capacity: usize::MAX,
            element_size: 8
        })
    ));
    assert_eq!(array.capacity(), 0);
}
