//! Contract tests for the in-memory event store.
//!
//! These exercise the append/load/global-log behaviour every backend must
//! provide: optimistic concurrency, dense versions, ranged reads and the
//! global log's bounds, direction and prefix filter.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use eventloom_core::aggregate::AggregateRoot;
use eventloom_core::codec::Codec;
use eventloom_core::event::{EventMetadata, SerializedEvent};
use eventloom_core::event_store::{EventStore, EventStoreError, ReadOptions};
use eventloom_core::identity::{CommandId, EventId, PrincipalId, SequenceId};
use eventloom_core::stream::{GlobalPosition, StreamId, TenantId, UpperBound, Version, VersionRange};
use eventloom_core::Utc;
use eventloom_testing::fixtures::{Sequence, SequenceEvent};
use eventloom_testing::InMemoryEventStore;
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Test Fixtures
// ============================================================================

fn item_added(aggregate_id: u64, value: u32) -> SerializedEvent {
    let event = SequenceEvent::ItemAdded(value);
    SerializedEvent {
        event_type: "ItemAdded.v1".to_string(),
        data: Codec::Bincode.encode(&event).unwrap(),
        metadata: EventMetadata {
            aggregate_type: Sequence::TYPE_TAG,
            aggregate_id: aggregate_id.to_string(),
            tenant_id: TenantId::empty(),
            event_id: EventId::generate(),
            command_id: CommandId::generate(),
            sequence_id: SequenceId::generate(),
            principal_id: PrincipalId::system(),
            timestamp: Utc::now(),
        },
    }
}

fn items(aggregate_id: u64, values: &[u32]) -> Vec<SerializedEvent> {
    values.iter().map(|v| item_added(aggregate_id, *v)).collect()
}

fn seq(n: u64) -> StreamId {
    StreamId::new(format!("seq-{n}"))
}

fn single() -> TenantId {
    TenantId::empty()
}

// ============================================================================
// Append and load
// ============================================================================

#[tokio::test]
async fn example_scenario_three_items_then_stale_append() {
    let store = InMemoryEventStore::new();

    let result = store
        .append(single(), seq(1), Version::NOT_CREATED, items(1, &[1, 2, 3]))
        .await
        .expect("first append succeeds");
    assert!(result.accepted);
    assert_eq!(result.new_version, Version::new(3));

    let stream = store
        .load_stream(single(), seq(1), VersionRange::all())
        .await
        .unwrap();
    let versions: Vec<u64> = stream.events.iter().map(|e| e.version.value()).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert_eq!(stream.version, Version::new(3));
    assert!(stream.reached_end);

    let stale = store
        .append(single(), seq(1), Version::NOT_CREATED, items(1, &[4]))
        .await;
    assert_eq!(
        stale,
        Err(EventStoreError::ConcurrencyConflict {
            stream_id: seq(1),
            expected: Version::new(0),
            actual: Version::new(3),
        })
    );
    assert_eq!(store.stream_version(&single(), &seq(1)), Version::new(3));
}

#[tokio::test]
async fn concurrent_appends_have_exactly_one_winner() {
    for _ in 0..20 {
        let store = Arc::new(InMemoryEventStore::new());
        store
            .append(single(), seq(1), Version::NOT_CREATED, items(1, &[1]))
            .await
            .unwrap();

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .append(single(), seq(1), Version::new(1), items(1, &[10 + i, 20 + i]))
                        .await
                })
            })
            .collect();

        let mut wins = 0;
        let mut conflicts = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(result) => {
                    wins += 1;
                    assert_eq!(result.new_version, Version::new(3));
                },
                Err(error) => conflicts.push(error),
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(
            conflicts,
            vec![EventStoreError::ConcurrencyConflict {
                stream_id: seq(1),
                expected: Version::new(1),
                actual: Version::new(3),
            }]
        );
        assert_eq!(store.global_log(&single()).len(), 3);
    }
}

#[tokio::test]
async fn empty_append_is_rejected_before_any_write() {
    let store = InMemoryEventStore::new();
    let result = store
        .append(single(), seq(1), Version::NOT_CREATED, Vec::new())
        .await;
    assert!(matches!(result, Err(EventStoreError::InvalidArgument(_))));
    assert!(store.is_empty());
}

#[tokio::test]
async fn missing_stream_loads_empty() {
    let store = InMemoryEventStore::new();
    let stream = store
        .load_stream(single(), seq(404), VersionRange::all())
        .await
        .unwrap();
    assert!(stream.events.is_empty());
    assert_eq!(stream.version, Version::NOT_CREATED);
    assert!(stream.reached_end);
    assert!(!store.stream_exists(single(), seq(404)).await.unwrap());
}

#[tokio::test]
async fn bounded_range_reports_unread_tail() {
    let store = InMemoryEventStore::new();
    store
        .append(single(), seq(1), Version::NOT_CREATED, items(1, &[1, 2, 3, 4, 5]))
        .await
        .unwrap();

    let head = store
        .load_stream(
            single(),
            seq(1),
            VersionRange::new(Version::new(1), UpperBound::Version(Version::new(3))),
        )
        .await
        .unwrap();
    let versions: Vec<u64> = head.events.iter().map(|e| e.version.value()).collect();
    assert_eq!(versions, vec![2, 3]);
    assert_eq!(head.version, Version::new(3));
    assert!(!head.reached_end);

    let tail = store
        .load_stream(single(), seq(1), VersionRange::after(Version::new(3)))
        .await
        .unwrap();
    assert_eq!(tail.events.len(), 2);
    assert!(tail.reached_end);

    let beyond = store
        .load_stream(single(), seq(1), VersionRange::after(Version::new(9)))
        .await
        .unwrap();
    assert!(beyond.events.is_empty());
    assert_eq!(beyond.version, Version::new(9));
}

#[tokio::test]
async fn tenants_are_isolated() {
    let store = InMemoryEventStore::new();
    let acme = TenantId::new("acme");
    store
        .append(acme.clone(), seq(1), Version::NOT_CREATED, items(1, &[1, 2]))
        .await
        .unwrap();

    assert!(store.stream_exists(acme.clone(), seq(1)).await.unwrap());
    assert!(!store.stream_exists(single(), seq(1)).await.unwrap());

    // Same stream id in another tenant starts from scratch.
    let other = store
        .append(single(), seq(1), Version::NOT_CREATED, items(1, &[9]))
        .await
        .unwrap();
    assert_eq!(other.new_version, Version::new(1));
    assert_eq!(store.global_log(&single())[0].position, GlobalPosition::new(1));
}

#[tokio::test]
async fn unavailable_store_reports_backend_errors() {
    let store = InMemoryEventStore::new();
    store.set_unavailable(true);
    assert!(matches!(
        store.initialize_schema().await,
        Err(EventStoreError::Backend(_))
    ));
    assert!(matches!(
        store
            .append(single(), seq(1), Version::NOT_CREATED, items(1, &[1]))
            .await,
        Err(EventStoreError::Backend(_))
    ));

    store.set_unavailable(false);
    store.initialize_schema().await.unwrap();
    assert_eq!(store.schema_initializations(), 1);
}

// ============================================================================
// Global log
// ============================================================================

async fn interleaved_store() -> InMemoryEventStore {
    let store = InMemoryEventStore::new();
    // Positions: 1 seq-1, 2 seq-1, 3 seq-2, 4 seq-1, 5 seq-2
    store
        .append(single(), seq(1), Version::new(0), items(1, &[1, 2]))
        .await
        .unwrap();
    store
        .append(single(), seq(2), Version::new(0), items(2, &[3]))
        .await
        .unwrap();
    store
        .append(single(), seq(1), Version::new(2), items(1, &[4]))
        .await
        .unwrap();
    store
        .append(single(), seq(2), Version::new(1), items(2, &[5]))
        .await
        .unwrap();
    store
}

fn positions(slice: &eventloom_core::event_store::GlobalLogSlice) -> Vec<u64> {
    slice.events.iter().map(|e| e.position.value()).collect()
}

#[tokio::test]
async fn global_log_orders_across_streams() {
    let store = interleaved_store().await;
    let slice = store
        .load_global_log(single(), ReadOptions::forward())
        .await
        .unwrap();
    assert_eq!(positions(&slice), vec![1, 2, 3, 4, 5]);
    assert_eq!(slice.last_position, Some(GlobalPosition::new(5)));
    assert!(slice.reached_end);

    let streams: Vec<&str> = slice.events.iter().map(|e| e.stream_id.as_str()).collect();
    assert_eq!(streams, vec!["seq-1", "seq-1", "seq-2", "seq-1", "seq-2"]);
    // Positions are independent from stream versions.
    assert_eq!(slice.events[3].version, Version::new(3));
}

#[tokio::test]
async fn global_log_pages_with_max_count() {
    let store = interleaved_store().await;
    let first = store
        .load_global_log(single(), ReadOptions::forward().with_max_count(2))
        .await
        .unwrap();
    assert_eq!(positions(&first), vec![1, 2]);
    assert!(!first.reached_end);

    let next = store
        .load_global_log(
            single(),
            ReadOptions::forward_after(first.last_position.unwrap()).with_max_count(2),
        )
        .await
        .unwrap();
    assert_eq!(positions(&next), vec![3, 4]);

    let last = store
        .load_global_log(
            single(),
            ReadOptions::forward_after(GlobalPosition::new(4)).with_max_count(2),
        )
        .await
        .unwrap();
    assert_eq!(positions(&last), vec![5]);
    assert!(last.reached_end);
}

#[tokio::test]
async fn global_log_backward_with_bounds() {
    let store = interleaved_store().await;
    let mut options = ReadOptions::backward().until(GlobalPosition::new(2), true);
    options.from = Some(GlobalPosition::new(5));

    let slice = store.load_global_log(single(), options).await.unwrap();
    assert_eq!(positions(&slice), vec![4, 3, 2]);

    let inclusive = store
        .load_global_log(
            single(),
            ReadOptions {
                from: Some(GlobalPosition::new(5)),
                from_inclusive: true,
                ..ReadOptions::backward()
            }
            .with_max_count(2),
        )
        .await
        .unwrap();
    assert_eq!(positions(&inclusive), vec![5, 4]);
}

#[tokio::test]
async fn global_log_prefix_filter() {
    let store = interleaved_store().await;
    let slice = store
        .load_global_log(single(), ReadOptions::forward().with_stream_prefix("seq-2"))
        .await
        .unwrap();
    assert_eq!(positions(&slice), vec![3, 5]);
}

#[tokio::test]
async fn global_log_rejects_zero_max_count() {
    let store = interleaved_store().await;
    let result = store
        .load_global_log(single(), ReadOptions::forward().with_max_count(0))
        .await;
    assert!(matches!(result, Err(EventStoreError::InvalidArgument(_))));
}

#[tokio::test]
async fn global_log_of_unknown_tenant_is_empty() {
    let store = interleaved_store().await;
    let slice = store
        .load_global_log(TenantId::new("nobody"), ReadOptions::forward())
        .await
        .unwrap();
    assert!(slice.events.is_empty());
    assert_eq!(slice.last_position, None);
    assert!(slice.reached_end);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn version_equals_number_of_appended_events(batches in prop::collection::vec(1_usize..5, 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let store = InMemoryEventStore::new();
            let mut expected = Version::NOT_CREATED;
            for size in &batches {
                let values: Vec<u32> = (0..*size).map(|v| u32::try_from(v).unwrap()).collect();
                let result = store
                    .append(single(), seq(7), expected, items(7, &values))
                    .await
                    .unwrap();
                prop_assert_eq!(result.new_version, expected + *size as u64);
                expected = result.new_version;
            }

            let total: usize = batches.iter().sum();
            let stream = store
                .load_stream(single(), seq(7), VersionRange::all())
                .await
                .unwrap();
            prop_assert_eq!(stream.events.len(), total);
            prop_assert_eq!(stream.version, Version::new(total as u64));
            let versions: Vec<u64> = stream.events.iter().map(|e| e.version.value()).collect();
            let ascending: Vec<u64> = (1..=total as u64).collect();
            prop_assert_eq!(versions, ascending);
            Ok(())
        })?;
    }
}
