//! Benchmarks for filling a `GrowableArray` through its growth policy.
//!
//! Besides timing, every benchmark records the bytes allocated per iteration, which shows the
//! cost of the early growth trigger compared to a preallocated array.

#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;

use alloc_tracker::{Allocator, Session};
use criterion::{Criterion, criterion_group, criterion_main};
use growable_array::{GrowableArray, TrackingStrategy};

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

const FILL_COUNT: u64 = 10_000;

fn entrypoint(c: &mut Criterion) {
    let allocs = Session::new();

    let mut group = c.benchmark_group("ga_append");

    let grow_op = allocs.operation("append_with_growth");
    group.bench_function("append_with_growth", |b| {
        b.iter(|| {
            let _span = grow_op.measure_process();

            let mut array = GrowableArray::new().unwrap();
            for value in 0..FILL_COUNT {
                array.append(black_box(value)).unwrap();
            }
            black_box(array);
        });
    });

    let preallocated_op = allocs.operation("append_preallocated");
    group.bench_function("append_preallocated", |b| {
        b.iter(|| {
            let _span = preallocated_op.measure_process();

            #[allow(
                clippy::cast_possible_truncation,
                reason = "the fill count fits in usize on every supported target"
            )]
            let mut array = GrowableArray::with_capacity(FILL_COUNT as usize).unwrap();
            for value in 0..FILL_COUNT {
                array.append(black_box(value)).unwrap();
            }
            black_box(array);
        });
    });

    let emplace_op = allocs.operation("emplace_strings");
    group.bench_function("emplace_strings", |b| {
        b.iter(|| {
            let _span = emplace_op.measure_process();

            let mut array = GrowableArray::new().unwrap();
            for _ in 0..1_000 {
                array
                    .emplace(|| String::with_capacity(black_box(16)))
                    .unwrap();
            }
            black_box(array);
        });
    });

    let tracked_op = allocs.operation("append_tracked_strategy");
    group.bench_function("append_tracked_strategy", |b| {
        let tracking = TrackingStrategy::heap();

        b.iter(|| {
            let _span = tracked_op.measure_process();

            let mut array = GrowableArray::new_in(&tracking).unwrap();
            for value in 0..FILL_COUNT {
                array.append(black_box(value)).unwrap();
            }
            black_box(array);
        });
    });

    group.finish();

    let mut group = c.benchmark_group("ga_lifecycle");

    let mut source = GrowableArray::new().unwrap();
    source.resize(1_000, 42_u64).unwrap();

    let clone_op = allocs.operation("clone_1000");
    group.bench_function("clone_1000", |b| {
        b.iter(|| {
            let _span = clone_op.measure_process();

            black_box(source.try_clone().unwrap());
        });
    });

    group.bench_function("take_and_return", |b| {
        b.iter(|| {
            let mut taken = source.take();
            black_box(&mut taken);
            source.move_from(&mut taken);
        });
    });

    group.finish();

    allocs.print_to_stdout();
}

criterion_group!(benches, entrypoint);
criterion_main!(benches);
