//! Change stream tailing for MongoEventStore.

use async_trait::async_trait;
use futures::StreamExt;
use mongodb::bson::{self, doc, Document, Timestamp};
use mongodb::change_stream::event::{ChangeStreamEvent, ResumeToken};
use mongodb::options::ChangeStreamOptions;

use crate::storage::{
    Change, ChangeFeed, ChangeStream, Result, StartPosition, StoreError, SubscriptionPosition,
};

use super::MongoEventStore;

#[async_trait]
impl ChangeFeed for MongoEventStore {
    async fn open(&self, start: StartPosition) -> Result<ChangeStream> {
        let mut options = ChangeStreamOptions::default();
        match start {
            StartPosition::Now => {}
            StartPosition::Beginning => {
                return Err(StoreError::Unsupported(
                    "a change stream cannot start before the oplog window; \
                     start from now or from a saved position"
                        .to_string(),
                ))
            }
            StartPosition::After(position) => {
                let token: ResumeToken = bson::from_bson(position.resume_token)
                    .map_err(|e| StoreError::InvalidResumeToken(e.to_string()))?;
                options.start_after = Some(token);
            }
        }

        let changes = self
            .events
            .watch()
            .pipeline(vec![doc! { "$match": { "operationType": "insert" } }])
            .with_options(options)
            .await?;

        Ok(changes
            .map(|event| -> Result<Change> { change_from_event(event?) })
            .boxed())
    }
}

fn change_from_event(event: ChangeStreamEvent<Document>) -> Result<Change> {
    let resume_token = bson::to_bson(&event.id)
        .map_err(|e| StoreError::InvalidResumeToken(e.to_string()))?;
    let document = event.full_document.ok_or_else(|| {
        StoreError::Unsupported("insert change without a full document".to_string())
    })?;
    let sequence = event.cluster_time.map(sequence_marker).unwrap_or_default();

    Ok(Change {
        document,
        position: SubscriptionPosition {
            resume_token,
            sequence,
        },
    })
}

/// Order-preserving integer form of a cluster time.
///
/// Every document written by one transaction carries the same value.
fn sequence_marker(cluster_time: Timestamp) -> u64 {
    (u64::from(cluster_time.time) << 32) | u64::from(cluster_time.increment)
}
