//! Per-subscriber worker loop.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::codec::EventCodec;
use crate::storage::{Change, ChangeStream, PositionStore, SaveOutcome, StoreError};

use super::{EventHandler, SubscriptionError};

pub(super) struct SubscriptionWorker {
    changes: ChangeStream,
    delivery: Delivery,
}

/// Everything needed to deliver one change.
struct Delivery {
    subscriber_id: String,
    positions: Arc<dyn PositionStore>,
    codec: EventCodec,
    handler: Arc<dyn EventHandler>,
}

impl SubscriptionWorker {
    pub(super) fn new(
        subscriber_id: String,
        changes: ChangeStream,
        positions: Arc<dyn PositionStore>,
        codec: EventCodec,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            changes,
            delivery: Delivery {
                subscriber_id,
                positions,
                codec,
                handler,
            },
        }
    }

    /// Deliver changes until stopped, the feed ends, or delivery fails.
    ///
    /// The stop signal is only checked between events.
    pub(super) async fn run(self, mut stop: watch::Receiver<bool>) -> Result<(), SubscriptionError> {
        let SubscriptionWorker {
            mut changes,
            delivery,
        } = self;
        info!("Subscription worker started");

        loop {
            let next = tokio::select! {
                biased;
                // A dropped sender means the registry is gone; stop as well.
                _ = stop.changed() => {
                    info!("Subscription worker stopped");
                    return Ok(());
                }
                next = changes.next() => next,
            };

            let change = match next {
                Some(Ok(change)) => change,
                Some(Err(e)) => return Err(stall(e.into())),
                None => {
                    info!("Change feed ended");
                    return Ok(());
                }
            };

            if let Err(e) = delivery.deliver(change).await {
                return Err(stall(e));
            }
        }
    }
}

impl Delivery {
    async fn deliver(&self, change: Change) -> Result<(), SubscriptionError> {
        let event = self
            .codec
            .decode(&change.document)
            .map_err(StoreError::from)?;
        let stream_id = event.stream_id.clone();
        let stream_version = event.stream_version;
        let sequence = change.position.sequence;

        debug!(%stream_id, stream_version, sequence, "Delivering event");
        self.handler
            .handle(event)
            .await
            .map_err(|source| SubscriptionError::Handler {
                subscriber_id: self.subscriber_id.clone(),
                stream_id: stream_id.clone(),
                stream_version,
                source,
            })?;

        match self
            .positions
            .save(&self.subscriber_id, &change.position)
            .await?
        {
            SaveOutcome::Advanced => {
                debug!(%stream_id, stream_version, sequence, "Position saved");
            }
            SaveOutcome::IgnoredStale => {
                warn!(%stream_id, stream_version, sequence, "Stale position save ignored");
            }
        }

        Ok(())
    }
}

fn stall(error: SubscriptionError) -> SubscriptionError {
    error!(error = %error, "Subscriber stalled; position not advanced");
    error
}
