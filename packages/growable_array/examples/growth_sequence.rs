//! Demonstrates how `GrowableArray` grows and how it reports running out of memory.
//!
//! The first part prints the capacity after each append, showing the early growth trigger.
//! The second part uses a tracking strategy with a byte limit to show that a failed append
//! leaves the array intact.

use growable_array::{Error, GrowableArray, TrackingStrategy};

fn main() -> Result<(), Error> {
    println!("=== GrowableArray growth sequence ===");
    println!();

    let mut array = GrowableArray::new()?;
    println!("Initial capacity: {}", array.capacity());

    for value in [10, 20, 30, 40, 50, 60, 70, 80, 90, 100] {
        let capacity_before = array.capacity();
        array.append(value)?;

        if array.capacity() == capacity_before {
            println!(
                "Appended {value:>3}: len {:>2}, capacity {:>2}",
                array.len(),
                array.capacity()
            );
        } else {
            println!(
                "Appended {value:>3}: len {:>2}, capacity {:>2} (grew from {capacity_before})",
                array.len(),
                array.capacity()
            );
        }
    }

    array.shrink_to_fit()?;
    println!("After shrink_to_fit: len {}, capacity {}", array.len(), array.capacity());

    println!();
    println!("=== Running out of memory ===");
    println!();

    let tracking = TrackingStrategy::heap().with_byte_limit(256);
    let mut limited = GrowableArray::<u64, _>::new_in(&tracking)?;

    for value in 0.. {
        if let Err(error) = limited.append(value) {
            println!("Append of {value} failed: {error}");
            break;
        }
    }

    println!(
        "The array still holds {} elements in {} slots, last element {}",
        limited.len(),
        limited.capacity(),
        limited.at(limited.len().saturating_sub(1))?
    );
    println!(
        "Strategy: {} live blocks, {} live bytes, {} refusals",
        tracking.live_blocks(),
        tracking.live_bytes(),
        tracking.refusals()
    );

    Ok(())
}
