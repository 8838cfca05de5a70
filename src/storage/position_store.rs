//! PositionStore trait definition.

use async_trait::async_trait;
use bson::Bson;

use super::Result;

/// Where a subscriber is in the change feed.
///
/// `resume_token` is opaque and only meaningful to the feed that produced
/// it. `sequence` orders positions of one feed and is what monotonicity is
/// checked against.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionPosition {
    pub resume_token: Bson,
    pub sequence: u64,
}

/// Outcome of a position save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The stored position now equals the saved one.
    Advanced,
    /// A later position was already stored; nothing changed.
    IgnoredStale,
}

/// Interface for subscriber checkpoints.
///
/// A stored position means everything up to and including it has been
/// handed to the subscriber's handler.
///
/// # Implementations
///
/// - `InMemoryPositionStore`: in-process storage
/// - `MongoPositionStore`: MongoDB storage
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Get the last saved position for a subscriber.
    ///
    /// Returns `None` if the subscriber never saved one.
    async fn load(&self, subscriber_id: &str) -> Result<Option<SubscriptionPosition>>;

    /// Save a position.
    ///
    /// Upserts. A position older than the stored one is ignored; an equal
    /// sequence is accepted since events written by one transaction share
    /// a sequence marker.
    async fn save(&self, subscriber_id: &str, position: &SubscriptionPosition)
        -> Result<SaveOutcome>;

    /// Remove a subscriber's position. Returns whether one existed.
    async fn delete(&self, subscriber_id: &str) -> Result<bool>;
}
