//! Registry lookup and relocation benchmarks.
//!
//! Measures the per-frame hot paths of a populated grid: cell lookups (with
//! disabled filtering), layer lookups, and relocation of a moving entity.
//!
//! Run with: `cargo bench --bench registry_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tessel_core::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A `side` x `side` grid with `per_cell` entities per cell. Every tenth
/// entity is disabled and every third is on the "obstacle" layer.
fn populated(side: i32, per_cell: usize) -> (EntityRegistry, Vec<EntityRef>) {
    let registry = EntityRegistry::new();
    let mut ids = EntityIdAllocator::new();
    let mut all = Vec::new();
    let mut n = 0usize;
    for x in 0..side {
        for y in 0..side {
            for _ in 0..per_cell {
                let mut e = Entity::new(ids.allocate(), Position::new(x, y));
                if n % 3 == 0 {
                    e = e.with_layer("obstacle");
                }
                let e = e.with_disabled(n % 10 == 0).into_ref();
                registry.register(&e);
                all.push(e);
                n += 1;
            }
        }
    }
    (registry, all)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_find_by_position(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_by_position");
    for per_cell in [1usize, 4, 16] {
        let (registry, _all) = populated(32, per_cell);
        group.bench_with_input(BenchmarkId::from_parameter(per_cell), &per_cell, |b, _| {
            let mut i = 0i32;
            b.iter(|| {
                i = (i + 7) % 32;
                black_box(registry.find_by_position(i, 31 - i).len());
            });
        });
    }
    group.finish();
}

fn bench_find_by_layer(c: &mut Criterion) {
    let (registry, _all) = populated(32, 2);
    c.bench_function("find_by_layer_2k", |b| {
        b.iter(|| black_box(registry.find_by_layer("obstacle").len()));
    });
}

fn bench_relocate(c: &mut Criterion) {
    let (registry, all) = populated(32, 4);
    let mover = all[all.len() / 2].clone();
    c.bench_function("relocate_back_and_forth", |b| {
        let mut flip = false;
        b.iter(|| {
            flip = !flip;
            let to = if flip { Position::new(0, 0) } else { Position::new(31, 31) };
            black_box(registry.relocate(&mover, to));
        });
    });
}

// ---------------------------------------------------------------------------
// Criterion groups and main
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_find_by_position,
    bench_find_by_layer,
    bench_relocate,
);
criterion_main!(benches);
