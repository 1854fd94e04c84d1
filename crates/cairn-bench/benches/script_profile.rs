//! Criterion benchmarks replaying script-shaped hook traces.

use std::hint::black_box;

use cairn_arena::Heap;
use cairn_bench::{growth_profile, replay, script_profile};
use cairn_core::HeapConfig;
use cairn_test_utils::CountingSource;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

/// 10k calls of object churn over 1024 slots on the default chunk size.
fn bench_script_churn(c: &mut Criterion) {
    let workload = script_profile(42, 1024, 10_000);
    let mut heap = Heap::new(HeapConfig::default()).unwrap();
    c.bench_function("script_churn_10k", |b| {
        b.iter(|| black_box(replay(&mut heap, &workload)));
    });
}

/// The same churn on 64 KiB chunks, so chunk acquisition and tail
/// retirement show up in the profile.
fn bench_script_churn_small_chunks(c: &mut Criterion) {
    let workload = script_profile(42, 1024, 10_000);
    c.bench_function("script_churn_10k_64k_chunks", |b| {
        b.iter_batched(
            || Heap::with_source(HeapConfig::new(64 * 1024), CountingSource::new()).unwrap(),
            |mut heap| {
                black_box(replay(&mut heap, &workload));
                heap
            },
            BatchSize::SmallInput,
        );
    });
}

/// 32 buffers doubling to 128 KiB in lockstep.
fn bench_growth(c: &mut Criterion) {
    let workload = growth_profile(32, 128 * 1024);
    let mut heap = Heap::new(HeapConfig::default()).unwrap();
    c.bench_function("growth_32_buffers_to_128k", |b| {
        b.iter(|| black_box(replay(&mut heap, &workload)));
    });
}

criterion_group!(
    benches,
    bench_script_churn,
    bench_script_churn_small_chunks,
    bench_growth,
);
criterion_main!(benches);
