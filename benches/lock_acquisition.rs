//! Benchmarks for lock acquisition overhead

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use redlock::*;
use std::time::{Duration, Instant};

/// Node that accepts every operation without doing any I/O.
struct AlwaysGrants;

impl NodeStoreClient for AlwaysGrants {
    async fn set(&self, _lock_id: &LockId) -> LockResult<String> {
        Ok("OK".to_string())
    }

    async fn confirm(&self, _lock_id: &LockId) -> LockResult<String> {
        Ok("1".to_string())
    }

    async fn release(&self, _lock_id: &LockId) -> LockResult<String> {
        Ok("1".to_string())
    }

    async fn close(&self) {}
}

struct AlwaysGrantsConnector;

impl NodeConnector for AlwaysGrantsConnector {
    type Client = AlwaysGrants;

    async fn connect(&self, _node: &LockingNode) -> LockResult<AlwaysGrants> {
        Ok(AlwaysGrants)
    }
}

fn bench_algorithm(c: &mut Criterion) {
    let lock_id = LockId::new_for("bench-lock");
    let start = Instant::now();
    let end = start + Duration::from_millis(40);

    let mut group = c.benchmark_group("algorithm");
    group.bench_function("has_enough_time_before_expire", |b| {
        b.iter(|| LockingAlgorithm::has_enough_time_before_expire(black_box(&lock_id), start, end))
    });
    group.bench_function("random_retry_interval", |b| {
        b.iter(|| LockingAlgorithm::random_retry_interval(black_box(&lock_id)))
    });
    group.finish();
}

fn bench_coordinator_fan_out(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("coordinator");
    for node_count in [1_u16, 3, 5, 7] {
        let nodes = (0..node_count)
            .map(|index| LockingNode::new("bench", 7001 + index))
            .collect();
        let coordinator =
            runtime.block_on(LockingCoordinator::connect(nodes, AlwaysGrantsConnector));

        group.bench_with_input(
            BenchmarkId::new("acquire_release", node_count),
            &coordinator,
            |b, coordinator| {
                b.to_async(&runtime).iter(|| async {
                    let lock_id = LockId::new_for("bench-lock");
                    if coordinator.try_acquire_lock(&lock_id).await {
                        coordinator.try_release_the_lock(&lock_id).await;
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_algorithm, bench_coordinator_fan_out);
criterion_main!(benches);
