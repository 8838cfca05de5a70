//! ChangeFeed trait definition.

use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;

use super::{Result, SubscriptionPosition};

/// Where to open a feed.
#[derive(Debug, Clone, PartialEq)]
pub enum StartPosition {
    /// Only inserts committed after the feed is opened.
    Now,
    /// Every insert the backend still has.
    Beginning,
    /// Inserts after a previously delivered position.
    After(SubscriptionPosition),
}

/// One inserted event document and the position just past it.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub document: Document,
    pub position: SubscriptionPosition,
}

/// Endless stream of inserts, in commit order.
pub type ChangeStream = BoxStream<'static, Result<Change>>;

/// Tailing primitive over inserted event documents.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn open(&self, start: StartPosition) -> Result<ChangeStream>;
}
