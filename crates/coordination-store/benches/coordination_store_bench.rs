use std::time::Duration;

use coordination_store::{BucketSpec, Context, CoordinationStore, InMemoryCoordinationStore};
use criterion::{Criterion, criterion_group, criterion_main};

fn bench_set_if_absent(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryCoordinationStore::new();
    let ctx = Context::background();
    let mut i: u64 = 0;

    c.bench_function("coordination_store/set_if_absent", |b| {
        b.iter(|| {
            i += 1;
            let key = format!("lock:{i}");
            rt.block_on(async {
                store
                    .set_if_absent(&ctx, &key, "owner", Duration::from_secs(30))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_take_token_single_key(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryCoordinationStore::new();
    let ctx = Context::background();
    let spec = BucketSpec::new(1_000, 1_000_000.0);

    c.bench_function("coordination_store/take_token_single_key", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .take_token(&ctx, "rl:bench", &spec, Duration::from_secs(60))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_take_token_many_keys(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryCoordinationStore::new();
    let ctx = Context::background();
    let spec = BucketSpec::new(10, 1.0);
    let mut i: u64 = 0;

    c.bench_function("coordination_store/take_token_many_keys", |b| {
        b.iter(|| {
            i = (i + 1) % 10_000;
            let key = format!("rl:{i}");
            rt.block_on(async {
                store
                    .take_token(&ctx, &key, &spec, Duration::from_secs(60))
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_set_if_absent,
    bench_take_token_single_key,
    bench_take_token_many_keys
);
criterion_main!(benches);
