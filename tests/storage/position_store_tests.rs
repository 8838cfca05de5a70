//! PositionStore interface tests.
//!
//! These tests verify the contract of the PositionStore trait.
//! Each storage implementation should run these tests.

use bson::{doc, Bson};
use uuid::Uuid;

use strand::storage::{PositionStore, SaveOutcome, SubscriptionPosition};

/// Unique subscriber id so runs against a shared database never collide.
pub fn subscriber_id(prefix: &str) -> String {
    format!("test_{}_{}", prefix, Uuid::new_v4())
}

/// Position with a document token, the shape change streams produce.
pub fn make_position(sequence: u64) -> SubscriptionPosition {
    SubscriptionPosition {
        resume_token: Bson::Document(doc! { "_data": format!("{:016X}", sequence) }),
        sequence,
    }
}

// =============================================================================
// PositionStore::load tests
// =============================================================================

pub async fn test_load_nonexistent<S: PositionStore>(store: &S) {
    let result = store
        .load(&subscriber_id("load_missing"))
        .await
        .expect("load should succeed");
    assert!(result.is_none(), "nonexistent position should be None");
}

// =============================================================================
// PositionStore::save tests
// =============================================================================

pub async fn test_save_and_load<S: PositionStore>(store: &S) {
    let id = subscriber_id("save_load");
    let position = make_position(42);

    let outcome = store
        .save(&id, &position)
        .await
        .expect("save should succeed");
    assert_eq!(outcome, SaveOutcome::Advanced);

    let loaded = store
        .load(&id)
        .await
        .expect("load should succeed")
        .expect("position should exist");
    assert_eq!(loaded, position, "should return stored position");
}

pub async fn test_save_advances<S: PositionStore>(store: &S) {
    let id = subscriber_id("save_advance");

    store.save(&id, &make_position(10)).await.unwrap();
    let outcome = store.save(&id, &make_position(25)).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Advanced);

    let loaded = store.load(&id).await.unwrap().unwrap();
    assert_eq!(loaded.sequence, 25, "should return updated position");
}

pub async fn test_save_regression_ignored<S: PositionStore>(store: &S) {
    let id = subscriber_id("save_regression");
    let newer = make_position(100);

    store.save(&id, &newer).await.unwrap();
    let outcome = store.save(&id, &make_position(99)).await.unwrap();
    assert_eq!(outcome, SaveOutcome::IgnoredStale);

    let loaded = store.load(&id).await.unwrap().unwrap();
    assert_eq!(loaded, newer, "older position must not replace newer one");
}

pub async fn test_save_equal_sequence_accepted<S: PositionStore>(store: &S) {
    let id = subscriber_id("save_equal");
    let first = make_position(7);
    let second = SubscriptionPosition {
        resume_token: Bson::Document(doc! { "_data": "later-token" }),
        sequence: 7,
    };

    store.save(&id, &first).await.unwrap();
    let outcome = store.save(&id, &second).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Advanced);

    let loaded = store.load(&id).await.unwrap().unwrap();
    assert_eq!(loaded.resume_token, second.resume_token);
}

pub async fn test_save_zero_sequence<S: PositionStore>(store: &S) {
    let id = subscriber_id("save_zero");

    store.save(&id, &make_position(0)).await.unwrap();
    let loaded = store.load(&id).await.unwrap().unwrap();
    assert_eq!(loaded.sequence, 0);
}

// =============================================================================
// PositionStore::delete tests
// =============================================================================

pub async fn test_delete<S: PositionStore>(store: &S) {
    let id = subscriber_id("delete");

    assert!(!store.delete(&id).await.unwrap(), "nothing to delete yet");
    store.save(&id, &make_position(5)).await.unwrap();
    assert!(store.delete(&id).await.unwrap());
    assert!(store.load(&id).await.unwrap().is_none());

    // A reset subscriber may start over from an earlier position.
    let outcome = store.save(&id, &make_position(1)).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Advanced);
}

// =============================================================================
// Isolation tests
// =============================================================================

pub async fn test_subscriber_isolation<S: PositionStore>(store: &S) {
    let a = subscriber_id("isolation_a");
    let b = subscriber_id("isolation_b");

    store.save(&a, &make_position(10)).await.unwrap();
    store.save(&b, &make_position(3)).await.unwrap();

    assert_eq!(store.load(&a).await.unwrap().unwrap().sequence, 10);
    assert_eq!(store.load(&b).await.unwrap().unwrap().sequence, 3);
}

#[macro_export]
macro_rules! run_position_store_tests {
    ($store:expr) => {
        use $crate::storage::position_store_tests::*;

        // load tests
        test_load_nonexistent($store).await;
        println!("  test_load_nonexistent: PASSED");

        // save tests
        test_save_and_load($store).await;
        println!("  test_save_and_load: PASSED");

        test_save_advances($store).await;
        println!("  test_save_advances: PASSED");

        test_save_regression_ignored($store).await;
        println!("  test_save_regression_ignored: PASSED");

        test_save_equal_sequence_accepted($store).await;
        println!("  test_save_equal_sequence_accepted: PASSED");

        test_save_zero_sequence($store).await;
        println!("  test_save_zero_sequence: PASSED");

        // delete tests
        test_delete($store).await;
        println!("  test_delete: PASSED");

        // isolation tests
        test_subscriber_isolation($store).await;
        println!("  test_subscriber_isolation: PASSED");
    };
}
