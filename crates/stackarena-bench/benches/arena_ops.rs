//! Criterion micro-benchmarks for arena allocation and release.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stackarena::{allocate, deallocate, StackBox, StackSlice};
use stackarena_bench::{nested_scopes, request_sizes, sibling_churn};

/// Benchmark: one raw allocate/deallocate pair on a warm arena.
fn bench_raw_pair(c: &mut Criterion) {
    c.bench_function("raw_alloc_free_64", |b| {
        b.iter(|| {
            let ptr = allocate(black_box(64)).unwrap();
            // SAFETY: `ptr` is the newest allocation on this thread.
            unsafe { deallocate(ptr.as_ptr()) };
        });
    });
}

/// Benchmark: StackBox against Box for a small value.
fn bench_small_box(c: &mut Criterion) {
    let mut group = c.benchmark_group("small_box");
    group.bench_function("stack_box", |b| {
        b.iter(|| {
            let v = StackBox::new(black_box([1u64; 4]));
            black_box(v[3]);
        });
    });
    group.bench_function("std_box", |b| {
        b.iter(|| {
            let v = Box::new(black_box([1u64; 4]));
            black_box(v[3]);
        });
    });
    group.finish();
}

/// Benchmark: 64 nested scopes of mixed sizes.
fn bench_nested_scopes(c: &mut Criterion) {
    let sizes = request_sizes(64, 2048, 42);
    c.bench_function("nested_scopes_64", |b| {
        b.iter(|| black_box(nested_scopes(black_box(&sizes))));
    });
}

/// Benchmark: sibling batches that repeatedly grow and retire blocks.
fn bench_sibling_churn(c: &mut Criterion) {
    c.bench_function("sibling_churn_16x1k", |b| {
        b.iter(|| black_box(sibling_churn(4, 16, 1024)));
    });
}

/// Benchmark: a 4K-element uninitialised slice.
fn bench_uninit_slice(c: &mut Criterion) {
    c.bench_function("uninit_slice_4k_f32", |b| {
        b.iter(|| {
            let s = StackSlice::<f32>::uninit(black_box(4096));
            black_box(s.len());
        });
    });
}

criterion_group!(
    benches,
    bench_raw_pair,
    bench_small_box,
    bench_nested_scopes,
    bench_sibling_churn,
    bench_uninit_slice
);
criterion_main!(benches);
