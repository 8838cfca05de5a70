//! MongoDB PositionStore implementation.

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{IndexOptions, UpdateOptions};
use mongodb::{Client, Collection, IndexModel};
use tracing::info;

use crate::storage::{PositionStore, Result, SaveOutcome, StoreError, SubscriptionPosition};

use super::is_duplicate_key;

const SUBSCRIBER_ID: &str = "subscriberId";
const RESUME_TOKEN: &str = "resumeToken";
const SEQUENCE_MARKER: &str = "sequenceMarker";

/// MongoDB implementation of PositionStore.
#[derive(Clone)]
pub struct MongoPositionStore {
    positions: Collection<Document>,
}

impl MongoPositionStore {
    /// Create a new MongoDB position store and ensure its indexes.
    pub async fn new(client: &Client, database_name: &str, collection_name: &str) -> Result<Self> {
        let positions = client.database(database_name).collection(collection_name);

        let store = Self { positions };
        store.init().await?;

        Ok(store)
    }

    /// Initialize indexes.
    async fn init(&self) -> Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { SUBSCRIBER_ID: 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.positions.create_index(index).await?;
        info!(collection = %self.positions.name(), "Position indexes ensured");

        Ok(())
    }
}

#[async_trait]
impl PositionStore for MongoPositionStore {
    async fn load(&self, subscriber_id: &str) -> Result<Option<SubscriptionPosition>> {
        let Some(document) = self
            .positions
            .find_one(doc! { SUBSCRIBER_ID: subscriber_id })
            .await?
        else {
            return Ok(None);
        };

        let resume_token = document
            .get(RESUME_TOKEN)
            .cloned()
            .ok_or_else(|| StoreError::InvalidResumeToken("stored position has no token".into()))?;
        let sequence = match document.get(SEQUENCE_MARKER) {
            Some(Bson::Int64(marker)) => u64::try_from(*marker).ok(),
            _ => None,
        }
        .ok_or_else(|| {
            StoreError::InvalidResumeToken("stored position has no valid sequence marker".into())
        })?;

        Ok(Some(SubscriptionPosition {
            resume_token,
            sequence,
        }))
    }

    async fn save(
        &self,
        subscriber_id: &str,
        position: &SubscriptionPosition,
    ) -> Result<SaveOutcome> {
        let marker = i64::try_from(position.sequence).map_err(|_| {
            StoreError::Unsupported(format!(
                "sequence marker {} exceeds the storable range",
                position.sequence
            ))
        })?;

        // Only matches when the stored marker is not ahead. Otherwise the
        // upsert collides with the existing subscriberId and is dropped.
        let filter = doc! {
            SUBSCRIBER_ID: subscriber_id,
            SEQUENCE_MARKER: { "$lte": marker },
        };
        let update = doc! {
            "$set": {
                RESUME_TOKEN: position.resume_token.clone(),
                SEQUENCE_MARKER: marker,
                "updatedAt": mongodb::bson::DateTime::now(),
            }
        };
        let options = UpdateOptions::builder().upsert(true).build();

        match self
            .positions
            .update_one(filter, update)
            .with_options(options)
            .await
        {
            Ok(_) => Ok(SaveOutcome::Advanced),
            Err(e) if is_duplicate_key(&e) => Ok(SaveOutcome::IgnoredStale),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, subscriber_id: &str) -> Result<bool> {
        let result = self
            .positions
            .delete_one(doc! { SUBSCRIBER_ID: subscriber_id })
            .await?;
        Ok(result.deleted_count > 0)
    }
}
