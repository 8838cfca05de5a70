//! EventStore interface tests.
//!
//! These tests verify the contract of the EventStore trait.
//! Each storage implementation should run these tests.

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use strand::event::{Data, Event};
use strand::storage::{EventStore, ExpectedVersion, StoreError};

/// Unique stream id so runs against a shared database never collide.
pub fn stream_id(prefix: &str) -> String {
    format!("test_{}_{}", prefix, Uuid::new_v4())
}

/// Create a test event with given type and guessed number.
pub fn make_event(event_type: &str, n: i64) -> Event {
    Event::builder("urn:numberguessinggame", event_type)
        .subject(format!("guess-{}", n))
        .json_data(serde_json::json!({ "guessedNumber": n }))
        .build()
        .expect("valid event")
}

/// Create multiple events.
pub fn make_events(count: i64) -> Vec<Event> {
    (0..count)
        .map(|i| make_event("NumberWasGuessed", i))
        .collect()
}

// =============================================================================
// EventStore::append tests
// =============================================================================

pub async fn test_append_to_new_stream<S: EventStore>(store: &S) {
    let id = stream_id("append_new");

    let result = store
        .append(&id, ExpectedVersion::NoStream, make_events(3))
        .await
        .expect("append should succeed");

    assert_eq!(result.stream_id, id);
    assert_eq!(result.old_version, None);
    assert_eq!(result.new_version, Some(2));
}

pub async fn test_append_sequential_batches<S: EventStore>(store: &S) {
    let id = stream_id("append_batches");

    store
        .append(&id, ExpectedVersion::NoStream, make_events(2))
        .await
        .unwrap();
    let result = store
        .append(&id, ExpectedVersion::Exact(1), make_events(3))
        .await
        .expect("second batch should succeed");
    assert_eq!(result.old_version, Some(1));
    assert_eq!(result.new_version, Some(4));

    let stream = store.read(&id).await.unwrap();
    let versions: Vec<u64> = stream.events.iter().map(|e| e.stream_version).collect();
    assert_eq!(versions, vec![0, 1, 2, 3, 4], "versions should be gapless");
}

pub async fn test_append_no_stream_on_existing_conflicts<S: EventStore>(store: &S) {
    let id = stream_id("append_exists");

    store
        .append(&id, ExpectedVersion::NoStream, make_events(1))
        .await
        .unwrap();
    let result = store
        .append(&id, ExpectedVersion::NoStream, make_events(1))
        .await;

    assert!(
        matches!(result, Err(StoreError::ConcurrencyConflict { .. })),
        "expected conflict, got {:?}",
        result
    );
}

pub async fn test_append_wrong_version_leaves_stream_unchanged<S: EventStore>(store: &S) {
    let id = stream_id("append_wrong_version");

    store
        .append(&id, ExpectedVersion::NoStream, make_events(3))
        .await
        .unwrap();
    let before = store.read(&id).await.unwrap();

    for expected in [0, 1, 3, 10] {
        let result = store
            .append(&id, ExpectedVersion::Exact(expected), make_events(2))
            .await;
        match result {
            Err(StoreError::ConcurrencyConflict { stream_id, expected: reported }) => {
                assert_eq!(stream_id, id);
                assert_eq!(reported, ExpectedVersion::Exact(expected));
            }
            other => panic!("expected conflict for {}, got {:?}", expected, other),
        }
    }

    let after = store.read(&id).await.unwrap();
    assert_eq!(before, after, "failed appends must not change the stream");
}

pub async fn test_append_exact_on_missing_stream_conflicts<S: EventStore>(store: &S) {
    let id = stream_id("append_missing");

    let result = store
        .append(&id, ExpectedVersion::Exact(0), make_events(1))
        .await;
    assert!(matches!(result, Err(StoreError::ConcurrencyConflict { .. })));
    assert!(!store.exists(&id).await.unwrap());
}

pub async fn test_append_any<S: EventStore>(store: &S) {
    let id = stream_id("append_any");

    let first = store
        .append(&id, ExpectedVersion::Any, make_events(2))
        .await
        .unwrap();
    assert_eq!(first.new_version, Some(1));

    let second = store
        .append(&id, ExpectedVersion::Any, make_events(1))
        .await
        .unwrap();
    assert_eq!(second.old_version, Some(1));
    assert_eq!(second.new_version, Some(2));
}

pub async fn test_append_empty_validates_version<S: EventStore>(store: &S) {
    let id = stream_id("append_empty");

    let result = store
        .append(&id, ExpectedVersion::NoStream, Vec::new())
        .await
        .expect("empty append on a new stream should succeed");
    assert_eq!(result.new_version, None);
    assert!(!store.exists(&id).await.unwrap(), "empty append writes nothing");

    store
        .append(&id, ExpectedVersion::NoStream, make_events(1))
        .await
        .unwrap();
    let result = store
        .append(&id, ExpectedVersion::Exact(7), Vec::new())
        .await;
    assert!(matches!(result, Err(StoreError::ConcurrencyConflict { .. })));
}

pub async fn test_append_empty_stream_id_rejected<S: EventStore>(store: &S) {
    let result = store
        .append("", ExpectedVersion::NoStream, make_events(1))
        .await;
    assert!(matches!(result, Err(StoreError::InvalidStreamId)));
}

pub async fn test_concurrent_creates_one_wins<S: EventStore>(store: &S) {
    let id = stream_id("append_race");

    let (a, b) = tokio::join!(
        store.append(&id, ExpectedVersion::NoStream, make_events(2)),
        store.append(&id, ExpectedVersion::NoStream, make_events(3)),
    );

    let winner_count = match (&a, &b) {
        (Ok(_), Err(StoreError::ConcurrencyConflict { .. })) => 2,
        (Err(StoreError::ConcurrencyConflict { .. }), Ok(_)) => 3,
        other => panic!("exactly one append should win, got {:?}", other),
    };

    let stream = store.read(&id).await.unwrap();
    // Versions start at 0: the winner's event count is version + 1.
    assert_eq!(stream.events.len(), winner_count);
    assert_eq!(stream.version, Some(winner_count as u64 - 1));
}

// =============================================================================
// EventStore::read tests
// =============================================================================

pub async fn test_read_missing_stream<S: EventStore>(store: &S) {
    let id = stream_id("read_missing");

    let stream = store.read(&id).await.expect("read should succeed");
    assert_eq!(stream.stream_id, id);
    assert_eq!(stream.version, None);
    assert!(stream.is_empty());
}

pub async fn test_read_preserves_order_and_content<S: EventStore>(store: &S) {
    let id = stream_id("read_order");
    let events = vec![
        make_event("NumberGuessingGameWasStarted", 0),
        make_event("NumberWasGuessed", 5),
        make_event("PlayerWasTooLow", 5),
    ];

    store
        .append(&id, ExpectedVersion::NoStream, events.clone())
        .await
        .unwrap();

    let stream = store.read(&id).await.unwrap();
    assert_eq!(stream.version, Some(2));
    assert_eq!(stream.events.len(), 3);
    for (version, (stored, original)) in stream.events.iter().zip(&events).enumerate() {
        assert_eq!(stored.stream_id, id);
        assert_eq!(stored.stream_version, version as u64);
        assert_eq!(&stored.event, original);
    }
}

pub async fn test_read_preserves_time_and_payloads<S: EventStore>(store: &S) {
    let id = stream_id("read_payloads");
    let time = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
    let events = vec![
        Event::builder("urn:test", "Timed")
            .time(time)
            .extension("correlationid", "corr-7")
            .extension("attempt", 2i64)
            .build()
            .unwrap(),
        Event::builder("urn:test", "Blob")
            .data("application/octet-stream", Data::Binary(vec![0, 1, 2, 255]))
            .build()
            .unwrap(),
        Event::builder("urn:test", "Note")
            .data("text/plain", Data::String("hello".into()))
            .build()
            .unwrap(),
    ];

    store
        .append(&id, ExpectedVersion::NoStream, events.clone())
        .await
        .unwrap();

    let stream = store.read(&id).await.unwrap();
    let read: Vec<Event> = stream.events.into_iter().map(|e| e.event).collect();
    assert_eq!(read, events);
}

pub async fn test_read_slice<S: EventStore>(store: &S) {
    let id = stream_id("read_slice");

    store
        .append(&id, ExpectedVersion::NoStream, make_events(5))
        .await
        .unwrap();

    let middle = store.read_slice(&id, 1, Some(2)).await.unwrap();
    let versions: Vec<u64> = middle.events.iter().map(|e| e.stream_version).collect();
    assert_eq!(versions, vec![1, 2]);
    assert_eq!(middle.version, Some(4), "version reflects the whole stream");

    let tail = store.read_slice(&id, 3, None).await.unwrap();
    assert_eq!(tail.events.len(), 2);

    let past_end = store.read_slice(&id, 10, None).await.unwrap();
    assert!(past_end.events.is_empty());
}

pub async fn test_stream_isolation<S: EventStore>(store: &S) {
    let a = stream_id("isolation_a");
    let b = stream_id("isolation_b");

    store
        .append(&a, ExpectedVersion::NoStream, make_events(2))
        .await
        .unwrap();
    store
        .append(&b, ExpectedVersion::NoStream, make_events(1))
        .await
        .unwrap();

    assert_eq!(store.read(&a).await.unwrap().events.len(), 2);
    assert_eq!(store.read(&b).await.unwrap().events.len(), 1);
    assert_eq!(store.read(&b).await.unwrap().version, Some(0));
}

// =============================================================================
// EventStore::exists tests
// =============================================================================

pub async fn test_exists<S: EventStore>(store: &S) {
    let id = stream_id("exists");

    assert!(!store.exists(&id).await.unwrap());
    store
        .append(&id, ExpectedVersion::NoStream, make_events(1))
        .await
        .unwrap();
    assert!(store.exists(&id).await.unwrap());
}

#[macro_export]
macro_rules! run_event_store_tests {
    ($store:expr) => {
        use $crate::storage::event_store_tests::*;

        // append tests
        test_append_to_new_stream($store).await;
        println!("  test_append_to_new_stream: PASSED");

        test_append_sequential_batches($store).await;
        println!("  test_append_sequential_batches: PASSED");

        test_append_no_stream_on_existing_conflicts($store).await;
        println!("  test_append_no_stream_on_existing_conflicts: PASSED");

        test_append_wrong_version_leaves_stream_unchanged($store).await;
        println!("  test_append_wrong_version_leaves_stream_unchanged: PASSED");

        test_append_exact_on_missing_stream_conflicts($store).await;
        println!("  test_append_exact_on_missing_stream_conflicts: PASSED");

        test_append_any($store).await;
        println!("  test_append_any: PASSED");

        test_append_empty_validates_version($store).await;
        println!("  test_append_empty_validates_version: PASSED");

        test_append_empty_stream_id_rejected($store).await;
        println!("  test_append_empty_stream_id_rejected: PASSED");

        test_concurrent_creates_one_wins($store).await;
        println!("  test_concurrent_creates_one_wins: PASSED");

        // read tests
        test_read_missing_stream($store).await;
        println!("  test_read_missing_stream: PASSED");

        test_read_preserves_order_and_content($store).await;
        println!("  test_read_preserves_order_and_content: PASSED");

        test_read_preserves_time_and_payloads($store).await;
        println!("  test_read_preserves_time_and_payloads: PASSED");

        test_read_slice($store).await;
        println!("  test_read_slice: PASSED");

        test_stream_isolation($store).await;
        println!("  test_stream_isolation: PASSED");

        // exists tests
        test_exists($store).await;
        println!("  test_exists: PASSED");
    };
}
