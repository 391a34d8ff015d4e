//! Benchmarks for change propagation through chains and fan-outs.
//!
//! Run with: cargo bench --bench propagation

use cascade_core::{functions, Engine};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// `v0 -> v1 -> ... -> v(n-1)`, each link copying the previous value.
fn chain(len: usize) -> Engine {
    let engine = Engine::new();
    for i in 0..len {
        engine.declare_variable(format!("v{i:05}"), 0).unwrap();
    }
    for i in 1..len {
        let input = format!("v{:05}", i - 1);
        engine
            .declare_equation(&format!("v{i:05}"), &[input], functions::identity)
            .unwrap();
    }
    engine
}

/// One source read by `width` equations, all summed into a single total.
fn fan_out(width: usize) -> Engine {
    let engine = Engine::new();
    engine.declare_variable("source", 0).unwrap();
    engine.declare_variable("total", 0).unwrap();
    let mut leaves = Vec::with_capacity(width);
    for i in 0..width {
        let leaf = format!("leaf{i:05}");
        engine.declare_variable(leaf.as_str(), 0).unwrap();
        engine
            .declare_equation(&leaf, &["source"], functions::identity)
            .unwrap();
        leaves.push(leaf);
    }
    engine
        .declare_equation("total", &leaves, functions::sum)
        .unwrap();
    engine
}

fn benchmark_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");
    for len in [10, 100, 1000] {
        let engine = chain(len);
        let mut next = 0i64;
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| {
                next += 1;
                engine.set("v00000", black_box(next)).unwrap()
            });
        });
    }
    group.finish();
}

fn benchmark_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for width in [10, 100, 1000] {
        let engine = fan_out(width);
        let mut next = 0i64;
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                next += 1;
                engine.set("source", black_box(next)).unwrap()
            });
        });
    }
    group.finish();
}

fn benchmark_noop_change(c: &mut Criterion) {
    let engine = chain(1000);
    engine.set("v00000", 1).unwrap();

    c.bench_function("noop_change", |b| {
        b.iter(|| engine.set("v00000", black_box(1)).unwrap());
    });
}

fn benchmark_declare(c: &mut Criterion) {
    c.bench_function("declare_chain_1000", |b| {
        b.iter(|| black_box(chain(1000)));
    });
}

criterion_group!(
    benches,
    benchmark_chain,
    benchmark_fan_out,
    benchmark_noop_change,
    benchmark_declare
);
criterion_main!(benches);
