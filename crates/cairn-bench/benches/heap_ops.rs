//! Criterion micro-benchmarks for the individual heap operations.

use std::hint::black_box;
use std::ptr;

use cairn_arena::Heap;
use cairn_core::HeapConfig;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

/// Allocate and immediately release one small block.
///
/// After the first iteration the block is always served from the free list.
fn bench_allocate_release_small(c: &mut Criterion) {
    let mut heap = Heap::new(HeapConfig::default()).unwrap();
    c.bench_function("allocate_release_24b", |b| {
        b.iter(|| {
            let p = heap.allocate(black_box(24)).unwrap();
            unsafe { heap.release(p.as_ptr()) }.unwrap();
        });
    });
}

/// Bump allocation from a fresh chunk, 1000 blocks of 64 bytes.
fn bench_bump_1k(c: &mut Criterion) {
    c.bench_function("bump_1k_x_64b", |b| {
        b.iter_batched(
            || Heap::new(HeapConfig::default()).unwrap(),
            |mut heap| {
                for _ in 0..1000 {
                    black_box(heap.allocate(64).unwrap());
                }
                heap
            },
            BatchSize::SmallInput,
        );
    });
}

/// First-fit scan over a fragmented free list.
///
/// 512 free 16-byte holes separated by live blocks; the request only fits
/// the single large hole at the end of the list.
fn bench_fragmented_take(c: &mut Criterion) {
    let mut heap = Heap::new(HeapConfig::default()).unwrap();
    let mut keep = Vec::new();
    for _ in 0..512 {
        let hole = heap.allocate(4).unwrap();
        keep.push(heap.allocate(4).unwrap());
        unsafe { heap.release(hole.as_ptr()) }.unwrap();
    }
    let big = heap.allocate(2000).unwrap();
    keep.push(heap.allocate(4).unwrap());
    unsafe { heap.release(big.as_ptr()) }.unwrap();

    c.bench_function("fragmented_take_513_nodes", |b| {
        b.iter(|| {
            let p = heap.allocate(black_box(1000)).unwrap();
            unsafe { heap.release(p.as_ptr()) }.unwrap();
        });
    });
    black_box(keep);
}

/// Grow one buffer from 16 bytes to 64 KiB by doubling through the hook.
fn bench_resize_doubling(c: &mut Criterion) {
    let mut heap = Heap::new(HeapConfig::default()).unwrap();
    c.bench_function("resize_doubling_to_64k", |b| {
        b.iter(|| unsafe {
            let mut p = heap.reallocate(ptr::null_mut(), 16);
            let mut size = 32;
            while size <= 64 * 1024 {
                p = heap.reallocate(p, size);
                size *= 2;
            }
            heap.reallocate(black_box(p), 0);
        });
    });
}

criterion_group!(
    benches,
    bench_allocate_release_small,
    bench_bump_1k,
    bench_fragmented_take,
    bench_resize_doubling,
);
criterion_main!(benches);
