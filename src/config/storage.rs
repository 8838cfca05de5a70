//! Storage and store settings as read from configuration files.

use std::time::Duration;

use serde::Deserialize;

use super::store::{
    QueryOptions, ReadConsistency, StoreConfig, TimeRepresentation, TransactionSettings,
};

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Memory,
    Mongodb,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// MongoDB-specific configuration.
    pub mongodb: MongodbConfig,
}

/// MongoDB-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MongodbConfig {
    /// MongoDB connection URI. Transactions need a replica set.
    pub uri: String,
    /// Database name.
    pub database: String,
    /// Collection holding event documents.
    pub events_collection: String,
    /// Collection holding subscription positions.
    pub positions_collection: String,
}

impl Default for MongodbConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017/?replicaSet=rs0".to_string(),
            database: "strand".to_string(),
            events_collection: "events".to_string(),
            positions_collection: "subscription_positions".to_string(),
        }
    }
}

/// Cursor defaults applied to every stream read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub batch_size: Option<u32>,
    pub max_time_ms: Option<u64>,
    pub no_cursor_timeout: Option<bool>,
}

/// File form of [`StoreConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub time_representation: TimeRepresentation,
    pub transactional_reads: bool,
    pub transaction: TransactionSettings,
    pub query: QuerySettings,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            time_representation: TimeRepresentation::default(),
            transactional_reads: true,
            transaction: TransactionSettings::default(),
            query: QuerySettings::default(),
        }
    }
}

impl StoreSettings {
    /// Build the runtime configuration.
    ///
    /// Query settings become the query hook; options already set by the
    /// caller win over the configured defaults.
    pub fn to_store_config(&self) -> StoreConfig {
        let mut builder = StoreConfig::builder()
            .time_representation(self.time_representation)
            .transaction(self.transaction.clone())
            .read_consistency(if self.transactional_reads {
                ReadConsistency::Transactional
            } else {
                ReadConsistency::Independent
            });

        if self.query != QuerySettings::default() {
            let query = self.query.clone();
            builder = builder.query_hook(move |options| QueryOptions {
                batch_size: options.batch_size.or(query.batch_size),
                max_time: options
                    .max_time
                    .or(query.max_time_ms.map(Duration::from_millis)),
                no_cursor_timeout: options.no_cursor_timeout.or(query.no_cursor_timeout),
            });
        }

        builder.build()
    }
}

impl From<&StoreSettings> for StoreConfig {
    fn from(settings: &StoreSettings) -> Self {
        settings.to_store_config()
    }
}
