//! Integration tests for the observable properties of `GrowableArray` through its public API.

use std::sync::Arc;

use growable_array::{AllocationStrategy, Error, GrowableArray, TrackingStrategy};
use testing::{Lifecycle, Tracked};

fn contents<T: Clone, A: AllocationStrategy>(array: &GrowableArray<T, A>) -> Vec<T> {
    (0..array.len())
        .map(|index| array.at(index).unwrap().clone())
        .collect()
}

#[test]
fn appended_values_are_returned_unchanged() {
    let mut array = GrowableArray::new().unwrap();

    for count in 1..=200_u32 {
        array.append(count * 7).unwrap();

        assert_eq!(array.len(), count as usize);
        assert!(array.capacity() >= array.len());
    }

    for index in 0..200 {
        assert_eq!(*array.at(index).unwrap(), (index as u32 + 1) * 7);
    }
}

#[test]
fn growth_preserves_existing_elements() {
    let mut array = GrowableArray::with_capacity(3).unwrap();
    array.append("a".to_string()).unwrap();

    let before = contents(&array);
    let capacity_before = array.capacity();

    // One live element in three slots triggers the early growth.
    array.append("b".to_string()).unwrap();

    assert!(array.capacity() > capacity_before);
    assert_eq!(contents(&array)[..1], before[..]);
    assert_eq!(array.at(1).unwrap(), "b");
}

#[test]
fn growth_sequence_scenario() {
    let mut array = GrowableArray::new().unwrap();
    assert_eq!(array.capacity(), 1);

    let capacities: Vec<_> = [10, 20, 30, 40]
        .into_iter()
        .map(|value| {
            array.append(value).unwrap();
            array.capacity()
        })
        .collect();

    assert_eq!(capacities, [3, 9, 9, 27]);
    assert_eq!(array.len(), 4);
    assert_eq!(*array.at(0).unwrap(), 10);
    assert_eq!(*array.at(3).unwrap(), 40);
}

#[test]
fn requested_capacity_is_kept_until_growth() {
    let array = GrowableArray::<u8>::with_capacity(17).unwrap();
    assert_eq!(array.capacity(), 17);
    assert!(array.is_empty());
}

#[test]
fn shrink_to_fit_matches_len() {
    let mut array = GrowableArray::new().unwrap();
    for value in 0..10 {
        array.append(value).unwrap();
    }
    // The tenth append sees 9 elements in 27 slots, which triggers growth to 81.
    assert_eq!(array.capacity(), 81);

    array.shrink_to_fit().unwrap();

    assert_eq!(array.capacity(), array.len());
    assert_eq!(contents(&array), (0..10).collect::<Vec<_>>());
}

#[test]
fn reserve_zero_on_non_empty_array_changes_nothing() {
    let mut array = GrowableArray::with_capacity(5).unwrap();
    array.append('q').unwrap();

    array.reserve(0).unwrap();

    assert_eq!(array.len(), 1);
    assert_eq!(array.capacity(), 5);
    assert_eq!(*array.at(0).unwrap(), 'q');
}

#[test]
fn resize_on_empty_array_fills_values() {
    let mut array = GrowableArray::empty();

    array.resize(5, 99).unwrap();

    assert_eq!(array.len(), 5);
    assert_eq!(contents(&array), [99, 99, 99, 99, 99]);
}

#[test]
fn at_boundaries() {
    let mut array = GrowableArray::new().unwrap();
    array.append(1).unwrap();
    array.append(2).unwrap();

    assert_eq!(*array.at(array.len() - 1).unwrap(), 2);
    assert!(matches!(
        array.at(array.len()),
        Err(Error::IndexOutOfRange { index: 2, len: 2 })
    ));
    assert!(matches!(
        array.at(array.len() + 5),
        Err(Error::IndexOutOfRange { .. })
    ));
}

#[test]
fn copies_are_independent() {
    let mut original = GrowableArray::new().unwrap();
    original.append(String::from("left")).unwrap();

    let mut copy = original.try_clone().unwrap();
    copy.at_mut(0).unwrap().push_str("-copy");
    copy.append(String::from("extra")).unwrap();

    assert_eq!(contents(&original), ["left"]);
    assert_eq!(contents(&copy), ["left-copy", "extra"]);
}

#[test]
fn move_transfers_without_leak_or_double_release() {
    let tracking = TrackingStrategy::heap();
    let lifecycle = Arc::new(Lifecycle::new());

    {
        let mut source = GrowableArray::new_in(&tracking).unwrap();
        for value in 0..5 {
            source.append(Tracked::new(value, &lifecycle)).unwrap();
        }

        let mut destination = GrowableArray::with_capacity_in(50, &tracking).unwrap();
        destination.append(Tracked::new(100, &lifecycle)).unwrap();

        destination.move_from(&mut source);

        assert_eq!(source.len(), 0);
        assert_eq!(source.capacity(), 0);
        assert_eq!(destination.len(), 5);
        assert_eq!(destination.at(4).unwrap().value(), 4);
        assert_eq!(lifecycle.drop_log(), [100]);

        let taken = destination.take();
        assert_eq!(destination.capacity(), 0);
        assert_eq!(taken.len(), 5);
    }

    assert_eq!(lifecycle.live(), 0);
    assert_eq!(lifecycle.clones(), 0);
    assert_eq!(tracking.live_blocks(), 0);
    assert_eq!(tracking.allocations(), tracking.deallocations());
}

#[test]
fn element_lifecycle_is_balanced_across_operations() {
    let tracking = TrackingStrategy::heap();
    let lifecycle = Arc::new(Lifecycle::new());

    {
        let mut array = GrowableArray::new_in(&tracking).unwrap();

        for value in 0..30 {
            array.append(Tracked::new(value, &lifecycle)).unwrap();
        }

        array.emplace(|| Tracked::new(30, &lifecycle)).unwrap();
        array.remove_last();
        array.reserve(10).unwrap();
        array.resize(15, Tracked::new(77, &lifecycle)).unwrap();

        let copy = array.clone();
        assert_eq!(copy.len(), 15);

        array.clear();
        array.append(Tracked::new(1_000, &lifecycle)).unwrap();
    }

    assert_eq!(lifecycle.live(), 0);
    assert_eq!(tracking.live_blocks(), 0);
}
