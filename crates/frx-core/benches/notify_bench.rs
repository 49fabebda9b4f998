//! Benchmarks for the tracking and notification hot paths.
//!
//! Run with: cargo bench -p frx-core --bench notify_bench

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use frx_core::{
    Array, Computed, Object, ReactiveCell, Value, Watcher, WatcherOptions, observe, run_microtasks,
    traverse,
};
use std::hint::black_box;

fn observed_object(keys: usize) -> Object {
    let object: Object = (0..keys).map(|i| (format!("k{i}"), Value::from(i))).collect();
    observe(&Value::from(object.clone()), false);
    object
}

// =============================================================================
// Tracked reads
// =============================================================================

fn bench_tracked_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("track/evaluate");

    for keys in [1usize, 16, 128] {
        let object = observed_object(keys);
        let names: Vec<String> = (0..keys).map(|i| format!("k{i}")).collect();
        let o = object.clone();
        let watcher = Watcher::new(
            move || {
                let mut sum = 0.0;
                for name in &names {
                    sum += o.get(name).as_f64().unwrap_or(0.0);
                }
                Ok(Value::from(sum))
            },
            None,
            WatcherOptions::default().lazy(),
        )
        .expect("lazy construction");

        group.bench_with_input(BenchmarkId::from_parameter(keys), &keys, |b, _| {
            b.iter(|| black_box(watcher.evaluate()))
        });
    }

    group.finish();
}

// =============================================================================
// Notify fan-out
// =============================================================================

fn bench_notify_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify/fanout");

    for subscribers in [1usize, 32, 256] {
        let cell = ReactiveCell::new(0u64);
        let watchers: Vec<Watcher> = (0..subscribers)
            .map(|_| {
                let c = cell.clone();
                Watcher::new(
                    move || Ok(Value::from(c.get() as f64)),
                    None,
                    WatcherOptions::default(),
                )
                .expect("evaluation succeeds")
            })
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| {
                    cell.update(|v| *v += 1);
                    black_box(run_microtasks())
                })
            },
        );
        drop(watchers);
    }

    group.finish();
}

// =============================================================================
// Computed chains
// =============================================================================

fn bench_computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed/chain");

    let source = ReactiveCell::new(1i32);
    let s = source.clone();
    let mut last = Computed::new(move || Ok(Value::from(s.get())));
    for _ in 0..16 {
        let prev = last.clone();
        last = Computed::new(move || {
            let v = prev.get().as_f64().unwrap_or(0.0);
            Ok(Value::from(v + 1.0))
        });
    }

    group.bench_function("depth_16_recompute", |b| {
        b.iter(|| {
            source.update(|v| *v += 1);
            black_box(last.get())
        })
    });

    group.bench_function("depth_16_cached", |b| b.iter(|| black_box(last.get())));

    group.finish();
}

// =============================================================================
// Deep traversal
// =============================================================================

fn bench_traverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("traverse");

    let items: Array = (0..256)
        .map(|i| Value::from(Object::new().with("id", i).with("done", i % 2 == 0)))
        .collect();
    let root = Value::from(Object::new().with("items", items));
    observe(&root, false);

    group.bench_function("array_256_objects", |b| b.iter(|| traverse(black_box(&root))));

    group.finish();
}

criterion_group!(
    benches,
    bench_tracked_reads,
    bench_notify_fanout,
    bench_computed_chain,
    bench_traverse
);
criterion_main!(benches);
