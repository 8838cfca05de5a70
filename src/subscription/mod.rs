//! Change subscriptions.
//!
//! A [`ChangeSubscriber`] runs one worker per subscriber id. Each worker
//! tails the change feed from the subscriber's saved position, decodes
//! every insert, hands it to the subscriber's [`EventHandler`], and saves
//! the position only once the handler returned `Ok`.
//!
//! Delivery is at least once: a crash between handler and save redelivers
//! that event on restart, so handlers must tolerate duplicates. A handler
//! error stalls the subscriber instead of skipping the event; the error is
//! returned by [`ChangeSubscriber::unsubscribe`].
//!
//! Running the same subscriber id in two processes at once is not
//! prevented here.

mod worker;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use crate::codec::EventCodec;
use crate::event::StreamEvent;
use crate::storage::{ChangeFeed, PositionStore, StartPosition, Storage, StoreError};

use worker::SubscriptionWorker;

/// Error type returned by event handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in the subscription registry or its workers.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Subscriber '{0}' is already running")]
    AlreadySubscribed(String),

    #[error("Subscriber '{0}' is not subscribed")]
    NotSubscribed(String),

    #[error(
        "Handler of subscriber '{subscriber_id}' failed on {stream_id}@{stream_version}: {source}"
    )]
    Handler {
        subscriber_id: String,
        stream_id: String,
        stream_version: u64,
        source: HandlerError,
    },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Worker of subscriber '{0}' panicked")]
    WorkerPanicked(String),
}

/// Callback invoked once per delivered event.
///
/// Implemented for async closures taking a [`StreamEvent`].
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: StreamEvent) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(StreamEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, event: StreamEvent) -> Result<(), HandlerError> {
        (self)(event).await
    }
}

/// Where a subscriber without a saved position starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartAt {
    /// Only events inserted after subscribing.
    #[default]
    Now,
    /// Everything the change feed still has.
    Beginning,
}

struct Worker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<Result<(), SubscriptionError>>,
}

/// Registry of subscription workers, keyed by subscriber id.
///
/// Dropping the registry stops every worker it started.
pub struct ChangeSubscriber {
    changes: Arc<dyn ChangeFeed>,
    positions: Arc<dyn PositionStore>,
    codec: EventCodec,
    default_start: StartAt,
    workers: Mutex<HashMap<String, Worker>>,
}

impl ChangeSubscriber {
    pub fn new(
        changes: Arc<dyn ChangeFeed>,
        positions: Arc<dyn PositionStore>,
        codec: EventCodec,
    ) -> Self {
        Self {
            changes,
            positions,
            codec,
            default_start: StartAt::default(),
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_storage(storage: &Storage) -> Self {
        Self::new(
            storage.changes.clone(),
            storage.positions.clone(),
            storage.codec.clone(),
        )
    }

    /// Start used by [`ChangeSubscriber::subscribe`].
    pub fn with_default_start(mut self, start: StartAt) -> Self {
        self.default_start = start;
        self
    }

    pub async fn subscribe<H: EventHandler>(
        &self,
        subscriber_id: &str,
        handler: H,
    ) -> Result<(), SubscriptionError> {
        self.subscribe_from(subscriber_id, self.default_start, handler)
            .await
    }

    /// Start a worker for `subscriber_id`.
    ///
    /// The feed is open when this returns, so events appended afterwards
    /// are delivered even with [`StartAt::Now`]. `start` only matters when
    /// no position is saved.
    pub async fn subscribe_from<H: EventHandler>(
        &self,
        subscriber_id: &str,
        start: StartAt,
        handler: H,
    ) -> Result<(), SubscriptionError> {
        let mut workers = self.workers.lock().await;

        if let Some(existing) = workers.get(subscriber_id) {
            if !existing.handle.is_finished() {
                return Err(SubscriptionError::AlreadySubscribed(
                    subscriber_id.to_string(),
                ));
            }
        }
        if let Some(finished) = workers.remove(subscriber_id) {
            if let Ok(Err(e)) = finished.handle.await {
                warn!(subscriber_id, error = %e, "Replacing stalled subscriber");
            }
        }

        let saved = self.positions.load(subscriber_id).await?;
        let resumed = saved.is_some();
        let position = match (saved, start) {
            (Some(position), _) => StartPosition::After(position),
            (None, StartAt::Now) => StartPosition::Now,
            (None, StartAt::Beginning) => StartPosition::Beginning,
        };
        let changes = self.changes.open(position).await?;

        let (stop, stop_rx) = watch::channel(false);
        let worker = SubscriptionWorker::new(
            subscriber_id.to_string(),
            changes,
            self.positions.clone(),
            self.codec.clone(),
            Arc::new(handler),
        );
        let span = tracing::info_span!("subscription", subscriber_id = %subscriber_id);
        let handle = tokio::spawn(worker.run(stop_rx).instrument(span));

        workers.insert(subscriber_id.to_string(), Worker { stop, handle });
        info!(subscriber_id, resumed, ?start, "Subscribed");

        Ok(())
    }

    /// Stop a worker after its in-flight event and wait for it.
    ///
    /// Returns the worker's outcome: `Ok` for a clean stop, the error that
    /// stalled it otherwise. The saved position is kept.
    pub async fn unsubscribe(&self, subscriber_id: &str) -> Result<(), SubscriptionError> {
        let worker = self
            .workers
            .lock()
            .await
            .remove(subscriber_id)
            .ok_or_else(|| SubscriptionError::NotSubscribed(subscriber_id.to_string()))?;

        worker.stop.send_replace(true);
        let outcome = match worker.handle.await {
            Ok(outcome) => outcome,
            Err(_) => Err(SubscriptionError::WorkerPanicked(subscriber_id.to_string())),
        };

        info!(subscriber_id, clean = outcome.is_ok(), "Unsubscribed");
        outcome
    }

    /// Whether the subscriber has a worker that has not finished.
    pub async fn is_running(&self, subscriber_id: &str) -> bool {
        self.workers
            .lock()
            .await
            .get(subscriber_id)
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Registered subscriber ids, sorted. Includes stalled ones.
    pub async fn subscriber_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop all workers and collect their outcomes, sorted by id.
    pub async fn shutdown(&self) -> Vec<(String, Result<(), SubscriptionError>)> {
        let ids = self.subscriber_ids().await;
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = self.unsubscribe(&id).await;
            outcomes.push((id, outcome));
        }
        outcomes
    }
}
