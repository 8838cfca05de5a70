//! In-memory PositionStore implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::{PositionStore, Result, SaveOutcome, SubscriptionPosition};

/// Position store that keeps positions in memory.
#[derive(Default)]
pub struct InMemoryPositionStore {
    positions: RwLock<HashMap<String, SubscriptionPosition>>,
}

impl InMemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionStore for InMemoryPositionStore {
    async fn load(&self, subscriber_id: &str) -> Result<Option<SubscriptionPosition>> {
        Ok(self.positions.read().await.get(subscriber_id).cloned())
    }

    async fn save(
        &self,
        subscriber_id: &str,
        position: &SubscriptionPosition,
    ) -> Result<SaveOutcome> {
        let mut positions = self.positions.write().await;
        match positions.get(subscriber_id) {
            Some(stored) if stored.sequence > position.sequence => Ok(SaveOutcome::IgnoredStale),
            _ => {
                positions.insert(subscriber_id.to_string(), position.clone());
                Ok(SaveOutcome::Advanced)
            }
        }
    }

    async fn delete(&self, subscriber_id: &str) -> Result<bool> {
        Ok(self.positions.write().await.remove(subscriber_id).is_some())
    }
}
