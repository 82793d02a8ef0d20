use common::Context;
use coordination_store::InMemoryCoordinationStore;
use criterion::{Criterion, criterion_group, criterion_main};
use rate_limit::{RateLimitConfig, TokenBucketLimiter};

fn bench_allow_single_key(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let limiter = TokenBucketLimiter::new(
        InMemoryCoordinationStore::new(),
        RateLimitConfig::new(1_000, 1_000_000.0),
    )
    .unwrap();
    let ctx = Context::background();

    c.bench_function("rate_limit/allow_single_key", |b| {
        b.iter(|| {
            rt.block_on(async {
                limiter.allow(&ctx, "client").await.unwrap();
            });
        });
    });
}

fn bench_allow_denied(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let limiter = TokenBucketLimiter::new(
        InMemoryCoordinationStore::new(),
        RateLimitConfig::new(1, 0.0001),
    )
    .unwrap();
    let ctx = Context::background();

    c.bench_function("rate_limit/allow_denied", |b| {
        b.iter(|| {
            rt.block_on(async {
                limiter.allow(&ctx, "client").await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_allow_single_key, bench_allow_denied);
criterion_main!(benches);
