//! Router and dispatcher benchmarks
//!
//! - path resolution in a wide registry
//! - single calls with and without middleware
//! - batches of growing size

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use nexus_rpc::batch::{CallRequest, RpcRequest};
use nexus_rpc::prelude::*;
use std::hint::black_box;

#[derive(Clone, Default)]
struct BenchContext;

#[derive(Debug, Deserialize, Serialize)]
struct BenchInput {
    value: i32,
}

impl Validate for BenchInput {}

#[derive(Debug, Serialize)]
struct BenchOutput {
    result: i32,
}

async fn double(_ctx: Context<BenchContext>, input: BenchInput) -> RpcResult<BenchOutput> {
    Ok(BenchOutput {
        result: input.value * 2,
    })
}

fn wide_router(namespaces: usize, per_namespace: usize) -> Router<BenchContext> {
    let mut router = Router::new();
    for ns in 0..namespaces {
        let mut child = Router::new();
        for i in 0..per_namespace {
            child = child.query(format!("proc{}", i), double);
        }
        router = router.merge(format!("ns{}", ns), child);
    }
    router
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for size in [1usize, 10, 50] {
        let router = wide_router(size, size).compile().unwrap();
        let path = format!("ns{}.proc{}", size - 1, size - 1);
        group.bench_with_input(BenchmarkId::from_parameter(size * size), &path, |b, path| {
            b.iter(|| black_box(router.resolve(black_box(path)).is_ok()));
        });
    }

    group.finish();
}

fn bench_call(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let input = serde_json::json!({"value": 42});

    let plain = Router::new().query("bench", double).compile().unwrap();
    let layered = Router::new()
        .middleware(|ctx, req, next: Next<BenchContext>| async move { next(ctx, req).await })
        .middleware_fn(logging_middleware(LogConfig::default()))
        .query("bench", double)
        .compile()
        .unwrap();

    let mut group = c.benchmark_group("call");
    for (name, router) in [("plain", &plain), ("middleware", &layered)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                rt.block_on(async {
                    black_box(
                        router
                            .call(Context::new(BenchContext), "bench", input.clone(), "bench")
                            .await
                            .unwrap(),
                    )
                })
            });
        });
    }
    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let router = Router::new().query("bench", double).compile().unwrap();
    let dispatcher = Dispatcher::new(router, StaticContext(BenchContext));
    let meta = RequestMeta::new();

    let mut group = c.benchmark_group("batch");
    for size in [1usize, 10, 100] {
        let calls: Vec<_> = (0..size)
            .map(|i| CallRequest::new("bench", serde_json::json!({"value": i})))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &calls, |b, calls| {
            b.iter(|| {
                rt.block_on(async {
                    black_box(
                        dispatcher
                            .handle(&meta, RpcRequest::Batch(calls.clone()))
                            .await
                            .unwrap(),
                    )
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resolve, bench_call, bench_batch);
criterion_main!(benches);
