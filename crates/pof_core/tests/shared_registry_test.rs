//! Integration test for the shared framebuffer registry.

use pof_core::{BindOutcome, BindRequest, HeadlessDevice, PixelFormat, ResourceRegistry, SymbolExchange};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_concurrent_acquire_release_destroys_once() {
    let registry = ResourceRegistry::new();
    let mut device = HeadlessDevice::new();

    let owner = registry.acquire("shared");
    registry
        .bind(&owner, &mut device, BindRequest::sized(128.0, 128.0))
        .unwrap();

    let num_threads = 8;
    let barrier = Arc::new(Barrier::new(num_threads));
    let workers: Vec<_> = (0..num_threads)
        .map(|_| {
            let registry = registry.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..1000 {
                    let handle = registry.acquire("shared");
                    let copy = handle.clone();
                    drop(handle);
                    registry.release(copy).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    // the owner kept it alive throughout
    assert_eq!(registry.ref_count("shared"), Some(1));
    assert_eq!(registry.pending_deletions(), 0);

    drop(owner);
    assert_eq!(registry.drain_deferred_deletions(&mut device), 1);
    assert_eq!(registry.drain_deferred_deletions(&mut device), 0);

    let stats = device.stats();
    assert_eq!(stats.allocations, 1);
    assert_eq!(stats.destructions, 1);
    assert_eq!(stats.live, 0);
}

#[test]
fn test_many_names_churn() {
    let registry = ResourceRegistry::new();
    let mut device = HeadlessDevice::new();

    for frame in 0..10 {
        let handles: Vec<_> = (0..20).map(|i| registry.acquire(&format!("fb{i}"))).collect();
        for handle in &handles {
            registry
                .bind(handle, &mut device, BindRequest::sized(16.0 + frame as f32, 16.0))
                .unwrap();
        }
        drop(handles);
        assert!(registry.is_empty());
        assert_eq!(registry.drain_deferred_deletions(&mut device), 20);
    }

    assert_eq!(device.stats().live, 0);
}

#[test]
fn test_two_holders_one_resource() {
    let registry = ResourceRegistry::new();
    let exchange = SymbolExchange::new();
    let mut device = HeadlessDevice::new();

    let writer = registry.acquire("feedback");
    let reader = registry.acquire("feedback");

    assert_eq!(
        registry.bind(&writer, &mut device, BindRequest::sized(64.0, 64.0)).unwrap(),
        BindOutcome::Allocated
    );
    // the other holder sees the same storage
    let address = exchange.encode("feedback");
    let seen = exchange.resolve_framebuffer(&registry, &address).unwrap();
    assert_eq!(seen.object, registry.info(&reader).object);

    // writer switches format; reader follows
    registry
        .bind(
            &writer,
            &mut device,
            BindRequest::sized(64.0, 64.0).with_format(PixelFormat::Rgb),
        )
        .unwrap();
    assert_eq!(registry.info(&reader).format, PixelFormat::Rgb);
    assert_eq!(registry.pending_deletions(), 1);

    drop(writer);
    assert!(exchange.resolve_framebuffer(&registry, &address).is_some());
    drop(reader);
    assert!(exchange.resolve_framebuffer(&registry, &address).is_none());
    assert_eq!(registry.drain_deferred_deletions(&mut device), 2);
}
