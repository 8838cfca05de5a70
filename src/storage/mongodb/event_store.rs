//! MongoDB EventStore implementation.

use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOneOptions, FindOptions, IndexOptions};
use mongodb::{Client, ClientSession, Collection, IndexModel};
use tracing::{debug, info, warn};

use crate::codec::{stream_version_of, EventCodec, STREAM_ID, STREAM_VERSION};
use crate::config::{QueryOptions, ReadConcernLevel, ReadConsistency, StoreConfig};
use crate::event::Event;
use crate::storage::helpers::{last_version, next_version, validate_stream_id};
use crate::storage::{AppendResult, EventStore, EventStream, ExpectedVersion, Result, StoreError};

use super::{is_conflict, transaction_options};

/// MongoDB implementation of EventStore.
#[derive(Clone)]
pub struct MongoEventStore {
    client: Client,
    pub(super) events: Collection<Document>,
    codec: EventCodec,
    config: StoreConfig,
}

impl MongoEventStore {
    /// Create a new MongoDB event store and ensure its indexes.
    pub async fn new(
        client: &Client,
        database_name: &str,
        collection_name: &str,
        config: StoreConfig,
    ) -> Result<Self> {
        let events = client.database(database_name).collection(collection_name);

        let store = Self {
            client: client.clone(),
            events,
            codec: EventCodec::new(config.time_representation()),
            config,
        };
        store.init().await?;

        Ok(store)
    }

    /// Initialize indexes.
    async fn init(&self) -> Result<()> {
        // Unique (streamId, streamVersion) is what rejects concurrent writers.
        let index = IndexModel::builder()
            .keys(doc! { STREAM_ID: 1, STREAM_VERSION: 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.events.create_index(index).await?;
        info!(collection = %self.events.name(), "Event indexes ensured");

        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn current_version(
        &self,
        stream_id: &str,
        session: Option<&mut ClientSession>,
    ) -> Result<Option<u64>> {
        let options = FindOneOptions::builder()
            .sort(doc! { STREAM_VERSION: -1 })
            .projection(doc! { STREAM_VERSION: 1 })
            .build();
        let find = self
            .events
            .find_one(doc! { STREAM_ID: stream_id })
            .with_options(options);

        let latest = match session {
            Some(session) => find.session(session).await?,
            None => find.await?,
        };

        match latest {
            Some(document) => Ok(stream_version_of(&document)?),
            None => Ok(None),
        }
    }

    fn find_options(&self, skip: u64, limit: Option<u64>) -> Result<FindOptions> {
        let mut options = FindOptions::builder()
            .sort(doc! { STREAM_VERSION: 1 })
            .build();
        if skip > 0 {
            options.skip = Some(skip);
        }
        if let Some(limit) = limit {
            let limit = i64::try_from(limit)
                .map_err(|_| StoreError::Unsupported(format!("limit {} is too large", limit)))?;
            options.limit = Some(limit);
        }

        let shaped = self.config.shape_query(QueryOptions::default());
        options.batch_size = shaped.batch_size;
        options.max_time = shaped.max_time;
        options.no_cursor_timeout = shaped.no_cursor_timeout;

        Ok(options)
    }

    async fn append_in_session(
        &self,
        session: &mut ClientSession,
        stream_id: &str,
        expected: ExpectedVersion,
        events: &[Event],
    ) -> Result<AppendResult> {
        let current = self.current_version(stream_id, Some(&mut *session)).await?;
        let first = next_version(stream_id, expected, current)?;
        let documents = events
            .iter()
            .zip(first..)
            .map(|(event, version)| self.codec.encode(event, stream_id, Some(version)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let new_version = last_version(first, documents.len(), current);

        if !documents.is_empty() {
            self.events
                .insert_many(documents)
                .session(&mut *session)
                .await
                .map_err(|e| map_conflict(e, stream_id, expected))?;
        }

        Ok(AppendResult {
            stream_id: stream_id.to_string(),
            old_version: current,
            new_version,
        })
    }

    async fn read_in_session(
        &self,
        session: &mut ClientSession,
        stream_id: &str,
        options: FindOptions,
    ) -> Result<(Option<u64>, Vec<Document>)> {
        let version = self.current_version(stream_id, Some(&mut *session)).await?;

        let mut cursor = self
            .events
            .find(doc! { STREAM_ID: stream_id })
            .with_options(options)
            .session(&mut *session)
            .await?;
        let mut documents = Vec::new();
        while cursor.advance(&mut *session).await? {
            documents.push(cursor.deserialize_current()?);
        }

        Ok((version, documents))
    }

    async fn read_independent(
        &self,
        stream_id: &str,
        options: FindOptions,
    ) -> Result<(Option<u64>, Vec<Document>)> {
        let version = self.current_version(stream_id, None).await?;

        let mut cursor = self
            .events
            .find(doc! { STREAM_ID: stream_id })
            .with_options(options)
            .await?;
        let mut documents = Vec::new();
        while cursor.advance().await? {
            documents.push(cursor.deserialize_current()?);
        }

        Ok((version, documents))
    }
}

fn map_conflict(error: mongodb::error::Error, stream_id: &str, expected: ExpectedVersion) -> StoreError {
    if is_conflict(&error) {
        StoreError::ConcurrencyConflict {
            stream_id: stream_id.to_string(),
            expected,
        }
    } else {
        StoreError::from(error)
    }
}

#[async_trait]
impl EventStore for MongoEventStore {
    #[tracing::instrument(skip_all, fields(stream_id = %stream_id, event_count = events.len()))]
    async fn append(
        &self,
        stream_id: &str,
        expected: ExpectedVersion,
        events: Vec<Event>,
    ) -> Result<AppendResult> {
        validate_stream_id(stream_id)?;

        let mut session = self.client.start_session().await?;
        session
            .start_transaction()
            .with_options(transaction_options(self.config.transaction(), None))
            .await?;

        match self
            .append_in_session(&mut session, stream_id, expected, &events)
            .await
        {
            Ok(result) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|e| map_conflict(e, stream_id, expected))?;
                debug!(
                    old_version = ?result.old_version,
                    new_version = ?result.new_version,
                    "Events appended"
                );
                Ok(result)
            }
            Err(e) => {
                if let Err(abort) = session.abort_transaction().await {
                    warn!(error = %abort, "Failed to abort append transaction");
                }
                Err(e)
            }
        }
    }

    #[tracing::instrument(skip_all, fields(stream_id = %stream_id, skip = skip, limit = ?limit))]
    async fn read_slice(
        &self,
        stream_id: &str,
        skip: u64,
        limit: Option<u64>,
    ) -> Result<EventStream> {
        validate_stream_id(stream_id)?;
        let options = self.find_options(skip, limit)?;

        let (version, documents) = match self.config.read_consistency() {
            ReadConsistency::Transactional => {
                let mut session = self.client.start_session().await?;
                session
                    .start_transaction()
                    .with_options(transaction_options(
                        self.config.transaction(),
                        Some(ReadConcernLevel::Snapshot),
                    ))
                    .await?;

                match self.read_in_session(&mut session, stream_id, options).await {
                    Ok(read) => {
                        session.commit_transaction().await?;
                        read
                    }
                    Err(e) => {
                        if let Err(abort) = session.abort_transaction().await {
                            warn!(error = %abort, "Failed to abort read transaction");
                        }
                        return Err(e);
                    }
                }
            }
            ReadConsistency::Independent => self.read_independent(stream_id, options).await?,
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
        let found = self
            .events
            .find_one(doc! { STREAM_ID: stream_id })
            .projection(doc! { STREAM_ID: 1 })
            .await?;
        Ok(found.is_some())
    }
}
