//! Property tests for roster-sync-engine
//!
//! Random interleavings of enqueues, remote writes, outages, passes and
//! resolutions must never break the queue's invariants.

use proptest::prelude::*;
use roster_sync_engine::{
    resolution, EngineConfig, EngineSnapshot, EntityKey, Error, ManualClock, MemoryRemote,
    MergePolicy, NewOperation, ProviderError, RemoteSnapshot, RemoteStateProvider,
    ResolutionStrategy, RetryPolicy, SyncEngine, SyncStatus,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Action {
    Create(u8, u8),
    Update(u8, u8),
    Delete(u8),
    RemotePut(u8, u8),
    RemoteDelete(u8),
    Offline(bool),
    Pass,
    Advance(u64),
    Resolve(ResolutionStrategy),
    Purge,
}

fn arb_strategy() -> impl Strategy<Value = ResolutionStrategy> {
    prop_oneof![
        Just(ResolutionStrategy::LocalWins),
        Just(ResolutionStrategy::RemoteWins),
        Just(ResolutionStrategy::Merge),
        Just(ResolutionStrategy::Manual),
    ]
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => (0u8..4, 0u8..3).prop_map(|(e, v)| Action::Create(e, v)),
        3 => (0u8..4, 0u8..3).prop_map(|(e, v)| Action::Update(e, v)),
        1 => (0u8..4).prop_map(Action::Delete),
        2 => (0u8..4, 0u8..3).prop_map(|(e, v)| Action::RemotePut(e, v)),
        1 => (0u8..4).prop_map(Action::RemoteDelete),
        1 => any::<bool>().prop_map(Action::Offline),
        4 => Just(Action::Pass),
        2 => (1u64..120_000).prop_map(Action::Advance),
        2 => arb_strategy().prop_map(Action::Resolve),
        1 => Just(Action::Purge),
    ]
}

fn key(entity: u8) -> EntityKey {
    EntityKey::new("employee", format!("e{entity}"))
}

fn payload(variant: u8) -> Value {
    match variant {
        0 => json!({"name": "Jane"}),
        1 => json!({"name": "Jane", "dept": "Eng"}),
        _ => json!({"name": "Janet", "salary": 5000}),
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn assert_consistent(engine: &SyncEngine<Arc<MemoryRemote>>) -> Result<(), TestCaseError> {
    engine
        .check_invariants()
        .map_err(TestCaseError::fail)?;

    let stats = engine.stats();
    let by_status: usize = SyncStatus::ALL.iter().map(|s| stats.count(*s)).sum();
    prop_assert_eq!(by_status, stats.total);
    prop_assert_eq!(stats.conflict, stats.open_conflicts);
    prop_assert!((0.0..=1.0).contains(&stats.success_rate));

    for op in engine.list_operations(&Default::default()) {
        prop_assert!(op.attempt_count <= op.max_attempts);
        prop_assert_ne!(op.status, SyncStatus::Syncing);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_invariants_hold_under_any_interleaving(
        actions in prop::collection::vec(arb_action(), 1..60),
    ) {
        let rt = runtime();
        let clock = Arc::new(ManualClock::new(1_000));
        let remote = MemoryRemote::new_shared(clock.clone());
        let engine = SyncEngine::with_clock(remote.clone(), EngineConfig::default(), clock.clone())
            .unwrap();

        for action in actions {
            match action {
                Action::Create(e, v) => {
                    engine.enqueue(NewOperation::create("employee", format!("e{e}"), payload(v)));
                }
                Action::Update(e, v) => {
                    engine.enqueue(NewOperation::update("employee", format!("e{e}"), payload(v)));
                }
                Action::Delete(e) => {
                    engine.enqueue(NewOperation::delete("employee", format!("e{e}")));
                }
                Action::RemotePut(e, v) => {
                    remote.put(key(e), payload(v));
                }
                Action::RemoteDelete(e) => {
                    remote.delete(key(e));
                }
                Action::Offline(offline) => remote.set_offline(offline),
                Action::Pass => {
                    rt.block_on(engine.run_pass());
                }
                Action::Advance(ms) => clock.advance(Duration::from_millis(ms)),
                Action::Resolve(strategy) => {
                    if let Some(conflict) = engine.list_conflicts().into_iter().next() {
                        let data = (strategy == ResolutionStrategy::Manual)
                            .then(|| json!({"name": "Manual"}));
                        let op = engine.resolve(&conflict.id, strategy, data).unwrap();
                        prop_assert_eq!(op.status, SyncStatus::Completed);

                        // A second resolve is rejected and changes nothing.
                        let before = engine.stats();
                        let again = engine.resolve(&conflict.id, strategy, None);
                        prop_assert_eq!(again, Err(Error::ConflictNotFound(conflict.id.clone())));
                        prop_assert_eq!(engine.stats(), before);
                    }
                }
                Action::Purge => {
                    engine.purge_completed();
                    prop_assert_eq!(engine.stats().completed, 0);
                }
            }
            assert_consistent(&engine)?;
        }
    }

    #[test]
    fn prop_snapshot_roundtrip(
        actions in prop::collection::vec(arb_action(), 1..40),
    ) {
        let rt = runtime();
        let clock = Arc::new(ManualClock::new(1_000));
        let remote = MemoryRemote::new_shared(clock.clone());
        let engine = SyncEngine::with_clock(remote.clone(), EngineConfig::default(), clock.clone())
            .unwrap();

        for action in actions {
            match action {
                Action::Create(e, v) | Action::Update(e, v) => {
                    engine.enqueue(NewOperation::update("employee", format!("e{e}"), payload(v)));
                }
                Action::RemotePut(e, v) => {
                    remote.put(key(e), payload(v));
                }
                Action::Pass => {
                    rt.block_on(engine.run_pass());
                }
                Action::Advance(ms) => clock.advance(Duration::from_millis(ms)),
                _ => {}
            }
        }

        let exported = engine.export_snapshot();
        let json = exported.to_json().unwrap();

        let restored = SyncEngine::with_clock(remote.clone(), EngineConfig::default(), clock.clone())
            .unwrap();
        rt.block_on(restored.import_snapshot(EngineSnapshot::from_json(&json).unwrap()))
            .unwrap();

        prop_assert_eq!(restored.export_snapshot(), exported);
        prop_assert_eq!(restored.stats(), engine.stats());
    }

    #[test]
    fn prop_backoff_is_monotonic_and_capped(
        base_ms in 1u64..5_000,
        extra_ms in 0u64..120_000,
        attempt in 1u32..64,
    ) {
        let policy = RetryPolicy::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(base_ms + extra_ms),
        );
        let current = policy.backoff(attempt);
        let next = policy.backoff(attempt + 1);

        prop_assert!(current <= next);
        prop_assert!(next <= policy.max_delay);
        prop_assert!(current >= policy.base_delay.min(policy.max_delay));
    }

    #[test]
    fn prop_decide_never_exceeds_budget(
        attempt_count in 0u32..20,
        max_attempts in 1u32..10,
        now in 0u64..1_000_000,
    ) {
        let decision = RetryPolicy::default().decide(attempt_count, max_attempts, now);
        prop_assert!(decision.attempt() <= max_attempts);
        prop_assert_eq!(decision.is_exhausted(), decision.attempt() == max_attempts);
    }

    #[test]
    fn prop_shallow_merge_keeps_every_key(
        remote in prop::collection::hash_map("[a-e]", 0i64..5, 0..5),
        local in prop::collection::hash_map("[a-e]", 0i64..5, 0..5),
    ) {
        let remote_value = json!(remote);
        let local_value = json!(local);
        let merged = resolution::merge(&remote_value, &local_value, MergePolicy::Shallow);

        for (k, v) in &local {
            prop_assert_eq!(&merged[k], &json!(v));
        }
        for (k, v) in &remote {
            if !local.contains_key(k) {
                prop_assert_eq!(&merged[k], &json!(v));
            }
        }
    }
}

/// Provider that records how many lookups are in flight per entity.
#[derive(Debug, Default)]
struct Tracking {
    in_flight: parking_lot::Mutex<HashMap<EntityKey, usize>>,
    overlaps: AtomicUsize,
}

impl RemoteStateProvider for Tracking {
    async fn fetch(&self, key: &EntityKey) -> Result<Option<RemoteSnapshot>, ProviderError> {
        {
            let mut in_flight = self.in_flight.lock();
            let count = in_flight.entry(key.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
        }

        tokio::time::sleep(Duration::from_millis(1)).await;

        if let Some(count) = self.in_flight.lock().get_mut(key) {
            *count -= 1;
        }
        Ok(None)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_attempt_per_entity_at_a_time() {
    let provider = Arc::new(Tracking::default());
    let clock = Arc::new(ManualClock::new(1_000));
    let config = EngineConfig {
        max_concurrency: 16,
        ..EngineConfig::default()
    };
    let engine = Arc::new(SyncEngine::with_clock(provider.clone(), config, clock).unwrap());

    for i in 0..64 {
        engine.enqueue(NewOperation::create(
            "employee",
            format!("e{}", i % 4),
            json!({"n": i}),
        ));
    }

    let passes: Vec<_> = (0..3)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run_pass().await })
        })
        .collect();
    for pass in passes {
        pass.await.unwrap();
    }

    assert_eq!(provider.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(engine.stats().completed, 64);
}
