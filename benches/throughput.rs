//! Throughput Benchmark for OctopusDB
//!
//! Measures the two layers separately: raw command execution inside a single
//! context, and end-to-end dispatch through the worker pool.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use octopusdb::command::Command;
use octopusdb::pool::{PoolConfig, WorkerPool};
use octopusdb::store::ExecutionContext;

/// Benchmark raw command execution in one context (no pool, no queue)
fn bench_context(c: &mut Criterion) {
    let mut group = c.benchmark_group("context");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set", |b| {
        let mut ctx = ExecutionContext::new(0);
        let mut i = 0u64;
        b.iter(|| {
            let cmd = Command::set(format!("key:{}", i), "small_value");
            black_box(ctx.execute(&cmd)).unwrap();
            i += 1;
        });
    });

    group.bench_function("set_large", |b| {
        let mut ctx = ExecutionContext::new(0);
        let value = Bytes::from("x".repeat(64 * 1024)); // 64KB value
        let mut i = 0u64;
        b.iter(|| {
            let cmd = Command::set(format!("key:{}", i), value.clone());
            black_box(ctx.execute(&cmd)).unwrap();
            i += 1;
        });
    });

    group.bench_function("get_hit", |b| {
        let mut ctx = ExecutionContext::new(0);
        for i in 0..100_000u64 {
            ctx.execute(&Command::set(format!("key:{}", i), format!("value:{}", i)))
                .unwrap();
        }
        let mut i = 0u64;
        b.iter(|| {
            let cmd = Command::get(format!("key:{}", i % 100_000));
            black_box(ctx.execute(&cmd)).unwrap();
            i += 1;
        });
    });

    group.bench_function("incr", |b| {
        let mut ctx = ExecutionContext::new(0);
        b.iter(|| {
            black_box(ctx.execute(&Command::incr("counter"))).unwrap();
        });
    });

    group.bench_function("rpush_lpop", |b| {
        let mut ctx = ExecutionContext::new(0);
        b.iter(|| {
            ctx.execute(&Command::rpush("queue", "item")).unwrap();
            black_box(ctx.execute(&Command::lpop("queue"))).unwrap();
        });
    });

    group.finish();
}

/// Benchmark end-to-end dispatch through the pool
fn bench_pool(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("pool");
    group.throughput(Throughput::Elements(1));

    group.bench_function("dispatch_set", |b| {
        let pool = rt.block_on(async { WorkerPool::new(PoolConfig::new(8)) });
        let mut i = 0u64;
        b.iter(|| {
            rt.block_on(async {
                let cmd = Command::set(format!("key:{}", i), "value");
                pool.dispatch(cmd).await.wait().await.unwrap();
            });
            i += 1;
        });
        rt.block_on(pool.shutdown());
    });

    group.bench_function("dispatch_burst_64", |b| {
        let pool = rt.block_on(async { WorkerPool::new(PoolConfig::new(8)) });
        let mut i = 0u64;
        b.iter(|| {
            rt.block_on(async {
                let mut handles = Vec::with_capacity(64);
                for n in 0..64u64 {
                    let cmd = Command::set(format!("key:{}:{}", i, n), "value");
                    handles.push(pool.dispatch(cmd).await);
                }
                for handle in handles {
                    handle.wait().await.unwrap();
                }
            });
            i += 1;
        });
        rt.block_on(pool.shutdown());
    });

    group.finish();
}

criterion_group!(benches, bench_context, bench_pool);
criterion_main!(benches);
