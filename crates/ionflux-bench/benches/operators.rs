//! Criterion benchmarks for the individual operators.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use ionflux_bench::{reference_profile, stress_profile};
use ionflux_core::NumMethod;
use ionflux_numerics::apply_all;

fn bench_transport_4k(c: &mut Criterion) {
    let mut case = reference_profile(42).unwrap();
    case.transport.init(&case.store).unwrap();
    c.bench_function("stefan_maxwell_4k", |b| {
        b.iter(|| {
            case.transport.execute(&mut case.store).unwrap();
            black_box(&case.store);
        });
    });
}

fn bench_transport_64k(c: &mut Criterion) {
    let mut case = stress_profile(42).unwrap();
    case.transport.init(&case.store).unwrap();
    c.bench_function("stefan_maxwell_64k", |b| {
        b.iter(|| {
            case.transport.execute(&mut case.store).unwrap();
            black_box(&case.store);
        });
    });
}

fn bench_sweep_4k(c: &mut Criterion) {
    let mut case = reference_profile(42).unwrap();
    case.transport.init(&case.store).unwrap();
    case.potential.init(&case.store).unwrap();
    c.bench_function("potential_sweep_4k", |b| {
        b.iter(|| {
            case.potential.execute(&mut case.store).unwrap();
            black_box(&case.store);
        });
    });
}

fn bench_boundary_4k(c: &mut Criterion) {
    let mut case = reference_profile(42).unwrap();
    c.bench_function("species_boundary_4k", |b| {
        b.iter(|| {
            apply_all(&mut case.species_boundary, &mut case.store).unwrap();
            black_box(&case.store);
        });
    });
}

criterion_group!(
    benches,
    bench_transport_4k,
    bench_transport_64k,
    bench_sweep_4k,
    bench_boundary_4k
);
criterion_main!(benches);
