//! Benchmarks for the redb engine.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use kvbridge_storage::{
    EngineIterator, KeyValueEngine, KeyValueEngineFactory, RedbEngineFactory, RedbKvEngine,
};

fn fresh_engine() -> (RedbEngineFactory, RedbKvEngine) {
    let mut factory = RedbEngineFactory::in_memory();
    let engine = factory.create_namespace("bench").unwrap();
    (factory, engine)
}

fn populated_engine(size: u64) -> (RedbEngineFactory, RedbKvEngine) {
    let (factory, mut engine) = fresh_engine();
    engine.begin_batch().unwrap();
    for i in 0..size {
        let key = format!("key:{i:05}");
        let value = format!("value:{i:05}");
        engine.put(key.as_bytes(), value.as_bytes()).unwrap();
    }
    engine.commit_batch().unwrap();
    (factory, engine)
}

/// Benchmark writes that each commit on their own.
fn bench_put_autocommit(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_put_autocommit");

    for size in [10, 100] {
        group.throughput(Throughput::Elements(size));
        group.bench_function(format!("put_autocommit_{size}"), |b| {
            b.iter_batched(
                fresh_engine,
                |(_factory, mut engine)| {
                    for i in 0..size {
                        let key = format!("key:{i:05}");
                        engine.put(key.as_bytes(), b"value").unwrap();
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark the same writes inside one batch, flushed every threshold.
fn bench_put_batched(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_put_batched");

    for size in [10, 100, 1000] {
        group.throughput(Throughput::Elements(size));
        group.bench_function(format!("put_batched_{size}"), |b| {
            b.iter_batched(
                fresh_engine,
                |(_factory, mut engine)| {
                    engine.begin_batch().unwrap();
                    for i in 0..size {
                        let key = format!("key:{i:05}");
                        engine.put(key.as_bytes(), b"value").unwrap();
                    }
                    engine.commit_batch().unwrap();
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark point reads outside a batch.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_get");
    group.throughput(Throughput::Elements(1));

    let (_factory, engine) = populated_engine(1000);
    let mut i = 0u64;
    group.bench_function("get_single", |b| {
        b.iter(|| {
            let key = format!("key:{:05}", i % 1000);
            i += 1;
            black_box(engine.get(key.as_bytes()).unwrap());
        });
    });

    group.finish();
}

/// Benchmark a full forward scan.
fn bench_range_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_range_scan");

    for size in [100, 1000] {
        group.throughput(Throughput::Elements(size));
        let (_factory, mut engine) = populated_engine(size);
        group.bench_function(format!("scan_{size}"), |b| {
            b.iter(|| {
                let mut iter = engine.range_scan(b"").unwrap();
                let mut count = 0u64;
                while iter.valid() {
                    count += 1;
                    iter.next().unwrap();
                }
                iter.release().unwrap();
                black_box(count);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_put_autocommit, bench_put_batched, bench_get, bench_range_scan);

criterion_main!(benches);
