//! Storage layer: stream store, position store and change feed.
//!
//! All backends share [`EventCodec`] for the document layout and
//! [`helpers::next_version`] for version assignment, so they differ only in
//! how atomicity and tailing are provided.

use std::sync::Arc;

use tracing::info;

use crate::codec::{DecodingError, EncodingError, EventCodec};
use crate::config::{Settings, StorageType};

mod change_feed;
mod event_store;
pub mod helpers;
pub mod memory;
mod position_store;

#[cfg(feature = "mongodb")]
pub mod mongodb;

pub use change_feed::{Change, ChangeFeed, ChangeStream, StartPosition};
pub use event_store::{AppendResult, EventStore, EventStream, ExpectedVersion};
pub use memory::{InMemoryEventStore, InMemoryPositionStore};
pub use position_store::{PositionStore, SaveOutcome, SubscriptionPosition};

#[cfg(feature = "mongodb")]
pub use self::mongodb::{MongoEventStore, MongoPositionStore};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Concurrency conflict on stream '{stream_id}': expected {expected}")]
    ConcurrencyConflict {
        stream_id: String,
        expected: ExpectedVersion,
    },

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Decoding error: {0}")]
    Decoding(#[from] DecodingError),

    #[error("Stream id must not be empty")]
    InvalidStreamId,

    #[error("Invalid resume token: {0}")]
    InvalidResumeToken(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[cfg(feature = "mongodb")]
    #[error("MongoDB error: {0}")]
    Mongo(#[from] ::mongodb::error::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}

/// Backend handles built from settings.
#[derive(Clone)]
pub struct Storage {
    pub events: Arc<dyn EventStore>,
    pub changes: Arc<dyn ChangeFeed>,
    pub positions: Arc<dyn PositionStore>,
    /// Codec matching the configured time representation.
    pub codec: EventCodec,
}

/// Initialize storage based on configuration.
pub async fn init_storage(settings: &Settings) -> Result<Storage> {
    let store_config = settings.store_config();
    let codec = EventCodec::new(store_config.time_representation());

    match settings.storage.storage_type {
        StorageType::Memory => {
            info!(storage = "memory", "Storage initialized");
            let events = InMemoryEventStore::new(store_config);
            Ok(Storage {
                events: Arc::new(events.clone()),
                changes: Arc::new(events),
                positions: Arc::new(InMemoryPositionStore::new()),
                codec,
            })
        }
        #[cfg(feature = "mongodb")]
        StorageType::Mongodb => {
            let mongo = &settings.storage.mongodb;
            info!(
                storage = "mongodb",
                database = %mongo.database,
                events_collection = %mongo.events_collection,
                "Storage initializing"
            );
            let client = ::mongodb::Client::with_uri_str(&mongo.uri).await?;

            let events = MongoEventStore::new(
                &client,
                &mongo.database,
                &mongo.events_collection,
                store_config,
            )
            .await?;
            let positions =
                MongoPositionStore::new(&client, &mongo.database, &mongo.positions_collection)
                    .await?;

            Ok(Storage {
                events: Arc::new(events.clone()),
                changes: Arc::new(events),
                positions: Arc::new(positions),
                codec,
            })
        }
        #[cfg(not(feature = "mongodb"))]
        StorageType::Mongodb => {
            tracing::error!("MongoDB storage requested but 'mongodb' feature is not enabled");
            Err(StoreError::Unsupported(
                "MongoDB storage requires the 'mongodb' feature".to_string(),
            ))
        }
    }
}
