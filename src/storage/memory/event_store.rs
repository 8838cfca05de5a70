//! In-memory EventStore and ChangeFeed implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::StreamExt;
use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::codec::EventCodec;
use crate::config::{ReadConsistency, StoreConfig};
use crate::event::Event;
use crate::storage::helpers::{last_version, next_version, validate_stream_id};
use crate::storage::{
    AppendResult, Change, ChangeFeed, ChangeStream, EventStore, EventStream, ExpectedVersion,
    Result, StartPosition, StoreError, SubscriptionPosition,
};

#[derive(Default)]
struct State {
    /// Every inserted document in commit order. Positions index into it.
    log: Vec<Document>,
    /// stream id -> version -> log index.
    streams: HashMap<String, BTreeMap<u64, usize>>,
}

impl State {
    fn current_version(&self, stream_id: &str) -> Option<u64> {
        self.streams
            .get(stream_id)
            .and_then(|versions| versions.keys().next_back().copied())
    }

    fn slice(&self, stream_id: &str, skip: u64, limit: Option<u64>) -> Vec<Document> {
        let Some(versions) = self.streams.get(stream_id) else {
            return Vec::new();
        };
        let skip = usize::try_from(skip).unwrap_or(usize::MAX);
        let limit = limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        versions
            .values()
            .skip(skip)
            .take(limit)
            .map(|&index| self.log[index].clone())
            .collect()
    }
}

struct Shared {
    state: RwLock<State>,
    /// Log length after the latest append.
    appended: watch::Sender<usize>,
}

/// Event store kept in process memory.
///
/// Clones share the same data. Also serves as the change feed for its
/// own inserts.
#[derive(Clone)]
pub struct InMemoryEventStore {
    shared: Arc<Shared>,
    codec: EventCodec,
    config: StoreConfig,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl InMemoryEventStore {
    pub fn new(config: StoreConfig) -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(State::default()),
                appended,
            }),
            codec: EventCodec::new(config.time_representation()),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of event documents across all streams.
    pub async fn len(&self) -> usize {
        self.shared.state.read().await.log.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[tracing::instrument(skip_all, fields(stream_id = %stream_id, event_count = events.len()))]
    async fn append(
        &self,
        stream_id: &str,
        expected: ExpectedVersion,
        events: Vec<Event>,
    ) -> Result<AppendResult> {
        validate_stream_id(stream_id)?;

        let mut guard = self.shared.state.write().await;
        let state = &mut *guard;

        let current = state.current_version(stream_id);
        let first = next_version(stream_id, expected, current)?;
        let documents = events
            .iter()
            .zip(first..)
            .map(|(event, version)| self.codec.encode(event, stream_id, Some(version)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let new_version = last_version(first, documents.len(), current);

        if documents.is_empty() {
            return Ok(AppendResult {
                stream_id: stream_id.to_string(),
                old_version: current,
                new_version,
            });
        }

        let versions = state.streams.entry(stream_id.to_string()).or_default();
        let start = state.log.len();
        if (first..).take(documents.len()).any(|v| versions.contains_key(&v)) {
            return Err(StoreError::ConcurrencyConflict {
                stream_id: stream_id.to_string(),
                expected,
            });
        }
        for (offset, version) in (first..).take(documents.len()).enumerate() {
            versions.insert(version, start + offset);
        }
        state.log.extend(documents);

        let log_len = state.log.len();
        drop(guard);
        self.shared.appended.send_replace(log_len);

        debug!(?current, ?new_version, "Events appended");
        Ok(AppendResult {
            stream_id: stream_id.to_string(),
            old_version: current,
            new_version,
        })
    }

    #[tracing::instrument(skip_all, fields(stream_id = %stream_id, skip = skip, limit = ?limit))]
    async fn read_slice(
        &self,
        stream_id: &str,
        skip: u64,
        limit: Option<u64>,
    ) -> Result<EventStream> {
        validate_stream_id(stream_id)?;

        let (version, documents) = match self.config.read_consistency() {
            ReadConsistency::Transactional => {
                let state = self.shared.state.read().await;
                (
                    state.current_version(stream_id),
                    state.slice(stream_id, skip, limit),
                )
            }
            ReadConsistency::Independent => {
                let version = self.shared.state.read().await.current_version(stream_id);
                // Writers may get in here, like between two database queries.
                tokio::task::yield_now().await;
                let documents = self.shared.state.read().await.slice(stream_id, skip, limit);
                (version, documents)
            }
        };

        let events = documents
            .iter()
            .map(|document| self.codec.decode(document))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(EventStream {
            stream_id: stream_id.to_string(),
            version,
            events,
        })
    }

    async fn exists(&self, stream_id: &str) -> Result<bool> {
        validate_stream_id(stream_id)?;
        Ok(self
            .shared
            .state
            .read()
            .await
            .current_version(stream_id)
            .is_some())
    }
}

#[async_trait]
impl ChangeFeed for InMemoryEventStore {
    async fn open(&self, start: StartPosition) -> Result<ChangeStream> {
        let next = match start {
            StartPosition::Now => self.shared.state.read().await.log.len(),
            StartPosition::Beginning => 0,
            StartPosition::After(position) => log_index(&position.resume_token)? + 1,
        };
        let receiver = self.shared.appended.subscribe();

        let changes = futures::stream::unfold(
            (self.shared.clone(), receiver, next),
            |(shared, mut receiver, next)| async move {
                loop {
                    receiver.borrow_and_update();
                    let document = shared.state.read().await.log.get(next).cloned();
                    if let Some(document) = document {
                        let position = SubscriptionPosition {
                            resume_token: Bson::Int64(next as i64),
                            sequence: next as u64,
                        };
                        let change = Change { document, position };
                        return Some((Ok(change), (shared, receiver, next + 1)));
                    }
                    if receiver.changed().await.is_err() {
                        return None;
                    }
                }
            },
        );

        Ok(changes.boxed())
    }
}

fn log_index(token: &Bson) -> Result<usize> {
    match token {
        Bson::Int64(index) => usize::try_from(*index)
            .map_err(|_| StoreError::InvalidResumeToken(format!("negative index {}", index))),
        other => Err(StoreError::InvalidResumeToken(format!(
            "expected an int64 log index, got {:?}",
            other.element_type()
        ))),
    }
}
