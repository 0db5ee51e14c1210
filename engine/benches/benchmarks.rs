//! Performance benchmarks for roster-sync-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use roster_sync_engine::{
    detector, resolution, EngineConfig, EntityKey, ManualClock, MemoryRemote, MergePolicy,
    NewOperation, OperationStore, Priority, RemoteSnapshot, SyncEngine, SyncOperation, SyncStatus,
};
use serde_json::json;
use std::sync::Arc;

fn populated_store(size: usize) -> OperationStore {
    let mut store = OperationStore::new();
    for i in 0..size {
        let priority = match i % 3 {
            0 => Priority::Low,
            1 => Priority::Medium,
            _ => Priority::High,
        };
        store.enqueue(
            NewOperation::update("employee", format!("e{i}"), json!({"name": "Test"}))
                .with_priority(priority),
            1_000 + i as u64,
            3,
        );
    }
    store
}

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");

    group.bench_function("enqueue", |b| {
        let mut store = OperationStore::new();
        let mut id = 0u64;

        b.iter(|| {
            id += 1;
            store.enqueue(
                black_box(NewOperation::create(
                    "employee",
                    format!("e{id}"),
                    json!({"name": "Test User"}),
                )),
                black_box(1_000),
                3,
            )
        })
    });

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("due_ordering", size), size, |b, &size| {
            let store = populated_store(size);
            b.iter(|| store.due(black_box(u64::MAX)))
        });
    }

    group.finish();
}

fn bench_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("detection");

    let mut op = SyncOperation::new(
        "op-1",
        NewOperation::update(
            "employee",
            "e1",
            json!({"name": "Jane", "dept": "Eng", "salary": 5000, "tags": ["a", "b"]}),
        ),
        1_000,
        0,
        3,
    );
    op.status = SyncStatus::Syncing;

    let unchanged = RemoteSnapshot::present(json!({"name": "Jane"}), 500);
    let diverged = RemoteSnapshot::present(
        json!({"name": "Janet", "dept": "Eng", "salary": "5000", "tags": ["a"]}),
        5_000,
    );

    group.bench_function("clear", |b| {
        b.iter(|| detector::detect(black_box(&op), Some(black_box(&unchanged)), 1_000))
    });
    group.bench_function("conflict", |b| {
        b.iter(|| detector::detect(black_box(&op), Some(black_box(&diverged)), 1_000))
    });

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for width in [4usize, 64, 512].iter() {
        let remote = json!((0..*width)
            .map(|i| (format!("k{i}"), json!({"v": i, "nested": {"w": i}})))
            .collect::<serde_json::Map<_, _>>());
        let local = json!((0..*width / 2)
            .map(|i| (format!("k{i}"), json!({"nested": {"x": i}})))
            .collect::<serde_json::Map<_, _>>());

        for policy in [MergePolicy::Shallow, MergePolicy::Deep] {
            group.bench_with_input(
                BenchmarkId::new(format!("{policy:?}"), width),
                width,
                |b, _| b.iter(|| resolution::merge(black_box(&remote), black_box(&local), policy)),
            );
        }
    }

    group.finish();
}

fn bench_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("pass");
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    for size in [100, 1_000].iter() {
        group.bench_with_input(BenchmarkId::new("run_pass", size), size, |b, &size| {
            b.iter_batched(
                || {
                    let clock = Arc::new(ManualClock::new(10_000));
                    let remote = MemoryRemote::new_shared(clock.clone());
                    for i in 0..size {
                        remote.put_at(
                            EntityKey::new("employee", format!("e{i}")),
                            json!({"name": "Remote"}),
                            if i % 2 == 0 { 500 } else { 5_000 },
                        );
                    }
                    let engine =
                        SyncEngine::with_clock(remote, EngineConfig::default(), clock).unwrap();
                    for i in 0..size {
                        engine.enqueue(NewOperation::update(
                            "employee",
                            format!("e{i}"),
                            json!({"name": "Local"}),
                        ));
                    }
                    engine
                },
                |engine| rt.block_on(engine.run_pass()),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    let store = populated_store(1);
    let op = store.iter().next().cloned().unwrap();

    group.bench_function("operation_to_json", |b| {
        b.iter(|| serde_json::to_string(black_box(&op)))
    });

    let json = serde_json::to_string(&op).unwrap();
    group.bench_function("operation_from_json", |b| {
        b.iter(|| serde_json::from_str::<SyncOperation>(black_box(&json)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_queue,
    bench_detection,
    bench_merge,
    bench_pass,
    bench_serialization,
);
criterion_main!(benches);
