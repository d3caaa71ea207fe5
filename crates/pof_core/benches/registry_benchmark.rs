//! # Registry Benchmark
//!
//! Per-frame cost of the shared framebuffer registry:
//! 1. acquire/release churn on shared names
//! 2. steady-state bind (nothing to reallocate)
//! 3. address-string resolution from scripts

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pof_core::{BindRequest, HeadlessDevice, ResourceRegistry, SymbolExchange};

/// Acquire then drop the same name, with N other holders keeping it alive
fn bench_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_acquire_release");

    for holders in [0usize, 16, 256] {
        let registry = ResourceRegistry::new();
        let _keep: Vec<_> = (0..holders).map(|_| registry.acquire("shared")).collect();

        group.bench_with_input(BenchmarkId::new("holders", holders), &holders, |b, _| {
            b.iter(|| {
                let handle = registry.acquire(black_box("shared"));
                drop(handle);
            });
        });
    }

    group.finish();
}

/// Identical bind requests every frame must not reallocate
fn bench_steady_bind(c: &mut Criterion) {
    let registry = ResourceRegistry::new();
    let mut device = HeadlessDevice::new();
    let handle = registry.acquire("cam");
    let request = BindRequest::sized(1920.0, 1080.0);
    let _ = registry.bind(&handle, &mut device, request);

    c.bench_function("registry_steady_bind", |b| {
        b.iter(|| {
            let _ = registry.bind(&handle, &mut device, black_box(request));
        });
    });
}

fn bench_resolve(c: &mut Criterion) {
    let registry = ResourceRegistry::new();
    let exchange = SymbolExchange::new();
    let mut device = HeadlessDevice::new();

    let handles: Vec<_> = (0..64).map(|i| registry.acquire(&format!("fb{i}"))).collect();
    for handle in &handles {
        let _ = registry.bind(handle, &mut device, BindRequest::sized(64.0, 64.0));
    }
    let address = exchange.encode("fb32");

    c.bench_function("symbol_resolve_framebuffer", |b| {
        b.iter(|| exchange.resolve_framebuffer(&registry, black_box(&address)));
    });
}

criterion_group!(benches, bench_acquire_release, bench_steady_bind, bench_resolve);
criterion_main!(benches);
