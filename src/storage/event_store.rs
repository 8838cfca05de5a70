//! EventStore trait definition.

use std::fmt;

use async_trait::async_trait;

use super::Result;
use crate::event::{Event, StreamEvent};

/// Version a writer expects the stream to be at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The stream must not exist yet.
    NoStream,
    /// The stream's last event must have exactly this version.
    Exact(u64),
    /// Append after whatever is there. Still guarded by the unique
    /// `(streamId, streamVersion)` constraint.
    Any,
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedVersion::NoStream => f.write_str("no stream"),
            ExpectedVersion::Exact(v) => write!(f, "version {}", v),
            ExpectedVersion::Any => f.write_str("any version"),
        }
    }
}

/// Result of a stream read.
#[derive(Debug, Clone, PartialEq)]
pub struct EventStream {
    pub stream_id: String,
    /// Version of the last event in the stream, `None` if it has none.
    ///
    /// Versions start at 0, so a full stream holds `version + 1` events.
    pub version: Option<u64>,
    /// Events ordered by `stream_version` ascending.
    pub events: Vec<StreamEvent>,
}

impl EventStream {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Result of a successful append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendResult {
    pub stream_id: String,
    /// Version before the append.
    pub old_version: Option<u64>,
    /// Version after the append. Equal to `old_version` for an empty append.
    pub new_version: Option<u64>,
}

/// Interface for event stream persistence.
///
/// Versions are assigned at append time, gapless from 0. Implementations
/// never retry on conflict; callers re-read and decide.
///
/// Implementations:
/// - `InMemoryEventStore`: in-process storage
/// - `MongoEventStore`: MongoDB storage
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events to a stream.
    ///
    /// Events get consecutive versions after the current one, in the order
    /// given. Either all of them are stored or none. A mismatch with
    /// `expected` fails with `StoreError::ConcurrencyConflict`.
    async fn append(
        &self,
        stream_id: &str,
        expected: ExpectedVersion,
        events: Vec<Event>,
    ) -> Result<AppendResult>;

    /// Read a whole stream.
    async fn read(&self, stream_id: &str) -> Result<EventStream> {
        self.read_slice(stream_id, 0, None).await
    }

    /// Read part of a stream: skip the first `skip` events, return at most
    /// `limit`. The reported version is always the stream's current one.
    async fn read_slice(
        &self,
        stream_id: &str,
        skip: u64,
        limit: Option<u64>,
    ) -> Result<EventStream>;

    /// Whether the stream has at least one event.
    async fn exists(&self, stream_id: &str) -> Result<bool>;
}
