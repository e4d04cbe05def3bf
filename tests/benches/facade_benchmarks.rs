//! # P2P Facade Benchmarks
//!
//! Hot paths that run once per discovered peer or per incoming
//! subscription batch:
//!
//! | Component | Operation | Target |
//! |-----------|-----------|--------|
//! | pf-01 Backoff cache | dial decision for a known peer | < 1µs |
//! | pf-01 Backoff cache | failure bookkeeping at capacity | < 1µs |
//! | pf-02 Subscription filter | 100-entry batch | < 100µs |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pf_01_connectivity::{BackoffCache, BackoffPolicy};
use pf_02_pubsub::{SubOpts, SubscriptionFilter};
use shared_types::PeerId;
use std::time::{Duration, Instant};

// ============================================================================
// PF-01: Backoff Cache
// ============================================================================

fn bench_backoff_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("pf-01-backoff-cache");
    group.measurement_time(Duration::from_secs(5));

    for capacity in [128usize, 1024, 8192] {
        let peers: Vec<PeerId> = (0..capacity).map(|_| PeerId::random()).collect();
        let now = Instant::now();
        let mut cache = BackoffCache::new(BackoffPolicy::default(), capacity);
        for peer in &peers {
            cache.begin_attempt(*peer, now);
            cache.record_failure(*peer, now);
        }

        group.bench_with_input(
            BenchmarkId::new("begin_attempt_backing_off", capacity),
            &peers,
            |b, peers| {
                let mut i = 0;
                b.iter(|| {
                    i = (i + 1) % peers.len();
                    black_box(cache.begin_attempt(peers[i], now))
                })
            },
        );
    }

    group.bench_function("record_failure_with_eviction", |b| {
        let mut cache = BackoffCache::new(BackoffPolicy::default(), 256);
        let now = Instant::now();
        b.iter(|| black_box(cache.record_failure(PeerId::random(), now)))
    });

    group.finish();
}

// ============================================================================
// PF-02: Subscription Filter
// ============================================================================

fn bench_subscription_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("pf-02-subscription-filter");

    let filter = SubscriptionFilter::new(r"^chain/\d+/(blocks|txs)$", 0)
        .unwrap_or_else(|e| panic!("bad pattern: {e}"));

    for size in [10usize, 100] {
        let batch: Vec<SubOpts> = (0..size)
            .map(|i| match i % 4 {
                0 => SubOpts::subscribe(format!("chain/{i}/blocks")),
                1 => SubOpts::unsubscribe(format!("chain/{}/blocks", i - 1)),
                2 => SubOpts::subscribe(format!("chain/{i}/txs")),
                _ => SubOpts::subscribe(format!("spam/{i}")),
            })
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("filter_incoming", size), &batch, |b, batch| {
            b.iter(|| black_box(filter.filter_incoming(batch.clone())))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_backoff_cache, bench_subscription_filter);
criterion_main!(benches);
