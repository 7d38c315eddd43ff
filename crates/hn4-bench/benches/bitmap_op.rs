//! Bitmap Operator microbenchmarks: alloc/free cycling.
#![allow(missing_docs, reason = "criterion bench binary, not a public API")]

use criterion::{Criterion, criterion_group, criterion_main};
use hn4_bench::bench_volume;
use hn4_core::Anchor;
use std::hint::black_box;

fn bench_alloc_free(c: &mut Criterion) {
    let volume = bench_volume(1_000_000);
    let mut n = 0u64;
    c.bench_function("alloc_block then free_block", |b| {
        b.iter(|| {
            let anchor = Anchor::new(black_box(5000), black_box(17), 0);
            let (placement, _) = volume.alloc_block(&anchor, n).unwrap();
            volume.free_block(placement.lba).unwrap();
            n = n.wrapping_add(1);
        });
    });
}

criterion_group!(benches, bench_alloc_free);
criterion_main!(benches);
