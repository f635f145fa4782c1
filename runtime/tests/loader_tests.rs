//! State loading and snapshot store tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use eventloom_core::aggregate::AggregateRoot;
use eventloom_core::codec::Codec;
use eventloom_core::command::CommandEnvelope;
use eventloom_core::environment::Clock;
use eventloom_core::snapshot::{Snapshot, SnapshotCreationPolicy, StoredSnapshot};
use eventloom_core::stream::{StreamId, TenantId, Version};
use eventloom_runtime::{AggregateStateLoader, Engine, EngineConfig, SaveOutcome, SnapshotStore};
use eventloom_testing::fixtures::{BankAccount, Sequence, SequenceCommand, SequenceState};
use eventloom_testing::{
    FixedClock, InMemoryEventBus, InMemoryEventStore, InMemorySnapshotBackend, test_clock,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

fn single() -> TenantId {
    TenantId::empty()
}

fn seq(n: u64) -> StreamId {
    StreamId::new(format!("seq-{n}"))
}

fn engine_over(
    store: Arc<InMemoryEventStore>,
    snapshots: Arc<InMemorySnapshotBackend>,
    config: EngineConfig,
) -> Engine {
    Engine::new(store, snapshots, Arc::new(InMemoryEventBus::new()), config)
}

async fn add_each(engine: &Engine, id: u64, values: &[u32]) {
    for value in values {
        engine
            .send::<Sequence>(&CommandEnvelope::new(id, SequenceCommand::Add(vec![*value])))
            .await
            .unwrap();
    }
}

fn stored(stream_id: StreamId, state: &SequenceState, version: u64, clock: &FixedClock) -> StoredSnapshot {
    StoredSnapshot {
        stream_id,
        version: Version::new(version),
        state_type: Sequence::TYPE_TAG,
        data: Codec::Bincode.encode(state).unwrap(),
        taken_at: clock.now(),
    }
}

// ============================================================================
// Loader
// ============================================================================

#[tokio::test]
async fn loader_resumes_after_snapshot_version() {
    let store = Arc::new(InMemoryEventStore::new());
    let backend = Arc::new(InMemorySnapshotBackend::new());
    let engine = engine_over(store.clone(), backend.clone(), EngineConfig::default().with_snapshots(false));
    engine.start().await.unwrap();
    add_each(&engine, 1, &[1, 2, 3]).await;

    // A snapshot at version 2 whose state differs from the log shows which
    // events were replayed on top of it.
    let clock = test_clock();
    let marker = SequenceState {
        items: vec![99],
        lifetime_total: 99,
    };
    backend.insert(single(), stored(seq(1), &marker, 2, &clock));

    let snapshots = SnapshotStore::new(backend, SnapshotCreationPolicy::every_commit(), Codec::Bincode);
    let loader = AggregateStateLoader::<Sequence>::new(store, snapshots, Codec::Bincode).unwrap();

    let seeded = loader.load(&single(), &1, true).await.unwrap();
    assert_eq!(seeded.state().items, vec![99, 3]);
    assert_eq!(seeded.expected_version(), Version::new(3));

    let replayed = loader.get_state(&single(), &1, false).await.unwrap();
    assert_eq!(replayed.items, vec![1, 2, 3]);
}

#[tokio::test]
async fn loader_of_missing_stream_is_default_state() {
    let loader = AggregateStateLoader::<Sequence>::new(
        Arc::new(InMemoryEventStore::new()),
        SnapshotStore::new(
            Arc::new(InMemorySnapshotBackend::new()),
            SnapshotCreationPolicy::default(),
            Codec::Bincode,
        ),
        Codec::Bincode,
    )
    .unwrap();

    let aggregate = loader.load(&single(), &42, true).await.unwrap();
    assert_eq!(aggregate.state(), &SequenceState::default());
    assert_eq!(aggregate.expected_version(), Version::NOT_CREATED);
}

#[tokio::test]
async fn unreadable_snapshots_fall_back_to_replay() {
    let store = Arc::new(InMemoryEventStore::new());
    let backend = Arc::new(InMemorySnapshotBackend::new());
    let engine = engine_over(store, backend.clone(), EngineConfig::default());
    engine.start().await.unwrap();
    add_each(&engine, 1, &[4, 5]).await;

    let mut corrupt = backend.get(&single(), &seq(1)).unwrap();
    corrupt.data = vec![0xff];
    backend.insert(single(), corrupt);

    let state = engine.get_state::<Sequence>(&single(), &1).await.unwrap();
    assert_eq!(state.items, vec![4, 5]);

    backend.fail_loads(true);
    let state = engine.get_state::<Sequence>(&single(), &1).await.unwrap();
    assert_eq!(state.items, vec![4, 5]);
}

#[tokio::test]
async fn snapshot_save_failures_do_not_fail_commands() {
    let backend = Arc::new(InMemorySnapshotBackend::new());
    backend.fail_saves(true);
    let engine = engine_over(Arc::new(InMemoryEventStore::new()), backend.clone(), EngineConfig::default());
    engine.start().await.unwrap();

    let result = engine
        .send::<Sequence>(&CommandEnvelope::new(1, SequenceCommand::Add(vec![1])))
        .await
        .unwrap();
    assert_eq!(result.resulting_version(), Version::new(1));
    assert!(backend.is_empty());
}

// ============================================================================
// Snapshot store
// ============================================================================

#[tokio::test]
async fn expired_snapshots_are_ignored() {
    let backend = Arc::new(InMemorySnapshotBackend::new());
    let clock = Arc::new(test_clock());
    let snapshots = SnapshotStore::new(
        backend,
        SnapshotCreationPolicy::every_commit().with_expire_after(Duration::from_secs(60)),
        Codec::Bincode,
    )
    .with_clock(clock.clone());

    let state = SequenceState {
        items: vec![1],
        lifetime_total: 1,
    };
    let outcome = snapshots
        .save::<Sequence>(&single(), &Snapshot::of(seq(1), state.clone(), Version::new(1)))
        .await;
    assert_eq!(outcome, SaveOutcome::Saved);

    clock.advance(chrono::Duration::seconds(30));
    let fresh = snapshots.load::<Sequence>(&single(), &seq(1)).await;
    assert_eq!(fresh, Snapshot::of(seq(1), state, Version::new(1)));

    clock.advance(chrono::Duration::seconds(31));
    let stale = snapshots.load::<Sequence>(&single(), &seq(1)).await;
    assert_eq!(stale, Snapshot::absent(seq(1)));
    assert!(!stale.has_snapshot());
}

#[tokio::test]
async fn snapshots_of_other_aggregate_types_are_ignored() {
    let backend = Arc::new(InMemorySnapshotBackend::new());
    let clock = test_clock();
    let mut foreign = stored(seq(1), &SequenceState::default(), 4, &clock);
    foreign.state_type = BankAccount::TYPE_TAG;
    backend.insert(single(), foreign);

    let snapshots = SnapshotStore::new(backend, SnapshotCreationPolicy::default(), Codec::Bincode);
    assert_eq!(
        snapshots.load::<Sequence>(&single(), &seq(1)).await,
        Snapshot::absent(seq(1))
    );
}

#[tokio::test]
async fn save_outcomes_follow_the_policy() {
    let backend = Arc::new(InMemorySnapshotBackend::new());
    let snapshots = SnapshotStore::new(
        backend.clone(),
        SnapshotCreationPolicy::threshold(5).with_min_version(Version::new(5)),
        Codec::Json,
    );
    let state = SequenceState::default();

    let outcome = |version| Snapshot::of(seq(1), state.clone(), Version::new(version));
    assert_eq!(
        snapshots.save::<Sequence>(&single(), &Snapshot::absent(seq(1))).await,
        SaveOutcome::NoState
    );
    assert_eq!(snapshots.save::<Sequence>(&single(), &outcome(5)).await, SaveOutcome::Skipped);
    assert_eq!(snapshots.save::<Sequence>(&single(), &outcome(7)).await, SaveOutcome::Skipped);
    assert_eq!(snapshots.save::<Sequence>(&single(), &outcome(10)).await, SaveOutcome::Saved);

    backend.fail_saves(true);
    assert_eq!(snapshots.save::<Sequence>(&single(), &outcome(15)).await, SaveOutcome::Failed);
    assert_eq!(backend.get(&single(), &seq(1)).unwrap().version, Version::new(10));
}

#[tokio::test]
async fn threshold_policy_snapshots_on_multiples() {
    let backend = Arc::new(InMemorySnapshotBackend::new());
    let engine = engine_over(
        Arc::new(InMemoryEventStore::new()),
        backend.clone(),
        EngineConfig::default().with_snapshot_policy(SnapshotCreationPolicy::threshold(3)),
    );
    engine.start().await.unwrap();
    add_each(&engine, 1, &[1, 2, 3, 4, 5, 6, 7]).await;

    assert_eq!(backend.save_count(), 2);
    assert_eq!(backend.get(&single(), &seq(1)).unwrap().version, Version::new(6));

    // Commits land at 9, 11 and 13; the jump over 12 skips it.
    for _ in 0..3 {
        engine
            .send::<Sequence>(&CommandEnvelope::new(1, SequenceCommand::Add(vec![0, 0])))
            .await
            .unwrap();
    }
    assert_eq!(backend.get(&single(), &seq(1)).unwrap().version, Version::new(9));
    assert_eq!(backend.save_count(), 3);
}

// ============================================================================
// Properties
// ============================================================================

fn command() -> impl Strategy<Value = SequenceCommand> {
    prop_oneof![
        4 => prop::collection::vec(0_u32..100, 1..4).prop_map(SequenceCommand::Add),
        1 => Just(SequenceCommand::Clear),
    ]
}

fn expected_state(commands: &[SequenceCommand]) -> SequenceState {
    commands.iter().fold(SequenceState::default(), |mut state, command| {
        match command {
            SequenceCommand::Add(values) => {
                state.items.extend(values);
                state.lifetime_total += values.iter().map(|v| u64::from(*v)).sum::<u64>();
            },
            SequenceCommand::Clear => state.items.clear(),
        }
        state
    })
}

proptest! {
    #[test]
    fn state_is_independent_of_snapshots(
        commands in prop::collection::vec(command(), 1..20),
        threshold in 1_u64..5,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let store = Arc::new(InMemoryEventStore::new());
            let engine = engine_over(
                store.clone(),
                Arc::new(InMemorySnapshotBackend::new()),
                EngineConfig::default()
                    .with_snapshot_policy(SnapshotCreationPolicy::threshold(threshold)),
            );
            engine.start().await.unwrap();
            for command in &commands {
                engine
                    .send::<Sequence>(&CommandEnvelope::new(1, command.clone()))
                    .await
                    .unwrap();
            }

            let loader = engine.loader::<Sequence>().unwrap();
            let with_snapshots = loader.get_state(&single(), &1, true).await.unwrap();
            let from_log = loader.get_state(&single(), &1, false).await.unwrap();

            prop_assert_eq!(&with_snapshots, &from_log);
            prop_assert_eq!(from_log, expected_state(&commands));
            Ok(())
        })?;
    }
}
