use criterion::{black_box, criterion_group, criterion_main, Criterion};
use estimator_core::cache::{normalize_key, TierKind, TieredCache};
use estimator_core::resilience::{CircuitBreaker, CircuitBreakerSettings};
use serde_json::json;
use std::time::Duration;
use tokio::runtime::Runtime;

fn benchmark_key_normalization(c: &mut Criterion) {
    let long_key = "estimate:".repeat(40);
    c.bench_function("normalize_short_key", |b| {
        b.iter(|| normalize_key(black_box("quote:fence:cedar:120ft")))
    });
    c.bench_function("normalize_long_key", |b| {
        b.iter(|| normalize_key(black_box(&long_key)))
    });
}

fn benchmark_memory_tier(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let cache = TieredCache::builder()
        .memory(10_000, Duration::from_secs(300))
        .build();
    runtime.block_on(async {
        cache
            .set("hot", &json!({"total": 4180.0}), None, &[TierKind::Memory])
            .await
            .unwrap();
    });

    c.bench_function("memory_get_hit", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(cache.get("hot", &[TierKind::Memory]).await) })
    });
    c.bench_function("memory_get_miss", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(cache.get("cold", &[TierKind::Memory]).await) })
    });
    c.bench_function("memory_set", |b| {
        b.to_async(&runtime).iter(|| async {
            cache
                .set_value("bench", json!(1), None, &[TierKind::Memory])
                .await
        })
    });
}

fn benchmark_circuit_breaker(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let breaker = CircuitBreaker::new("bench".to_string(), CircuitBreakerSettings::default());

    c.bench_function("circuit_breaker_closed_call", |b| {
        b.to_async(&runtime)
            .iter(|| async { breaker.call(|| async { Ok(black_box(1)) }).await })
    });
}

criterion_group!(
    benches,
    benchmark_key_normalization,
    benchmark_memory_tier,
    benchmark_circuit_breaker
);
criterion_main!(benches);
