//! Runtime store configuration.
//!
//! [`StoreConfig`] is built once and shared read-only by the stream store
//! and the codec. Changing a setting means building a new instance through
//! [`StoreConfig::to_builder`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

/// How the event `time` attribute is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRepresentation {
    /// RFC 3339 string that keeps the original offset and precision.
    #[default]
    Rfc3339String,
    /// Native database date. UTC only, millisecond resolution.
    NativeDate,
}

/// Whether the two queries behind a stream read share a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadConsistency {
    /// Version and events are read inside one transaction.
    #[default]
    Transactional,
    /// Version and events are read by independent queries. The reported
    /// version may lag the returned events if an append lands in between.
    Independent,
}

/// Read concern passed through to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadConcernLevel {
    Local,
    Majority,
    Snapshot,
}

/// Write acknowledgment passed through to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAcknowledgment {
    Majority,
    Nodes(u32),
}

/// Transaction knobs. `None` leaves the database default in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransactionSettings {
    pub read_concern: Option<ReadConcernLevel>,
    pub write_concern: Option<WriteAcknowledgment>,
    pub journal: Option<bool>,
    pub max_commit_time_ms: Option<u64>,
}

/// Cursor-level options for the event query of a read.
///
/// Filter and sort are not part of this type, so a query hook can only
/// tune how results are fetched, never which results or in what order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub batch_size: Option<u32>,
    pub max_time: Option<Duration>,
    pub no_cursor_timeout: Option<bool>,
}

/// Hook applied to the event query of every read.
pub type QueryHook = Arc<dyn Fn(QueryOptions) -> QueryOptions + Send + Sync>;

/// Immutable store configuration.
#[derive(Clone)]
pub struct StoreConfig {
    time_representation: TimeRepresentation,
    transaction: TransactionSettings,
    read_consistency: ReadConsistency,
    query_hook: QueryHook,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("time_representation", &self.time_representation)
            .field("transaction", &self.transaction)
            .field("read_consistency", &self.read_consistency)
            .finish_non_exhaustive()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfigBuilder::default().build()
    }
}

impl StoreConfig {
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Start a builder seeded with this configuration.
    pub fn to_builder(&self) -> StoreConfigBuilder {
        StoreConfigBuilder {
            time_representation: self.time_representation,
            transaction: self.transaction.clone(),
            read_consistency: self.read_consistency,
            query_hook: Some(self.query_hook.clone()),
        }
    }

    pub fn time_representation(&self) -> TimeRepresentation {
        self.time_representation
    }

    pub fn transaction(&self) -> &TransactionSettings {
        &self.transaction
    }

    pub fn read_consistency(&self) -> ReadConsistency {
        self.read_consistency
    }

    pub fn transactional_reads(&self) -> bool {
        self.read_consistency == ReadConsistency::Transactional
    }

    /// Run the query hook over the given options.
    pub fn shape_query(&self, options: QueryOptions) -> QueryOptions {
        (self.query_hook)(options)
    }
}

/// Builder for [`StoreConfig`].
#[derive(Default)]
pub struct StoreConfigBuilder {
    time_representation: TimeRepresentation,
    transaction: TransactionSettings,
    read_consistency: ReadConsistency,
    query_hook: Option<QueryHook>,
}

impl StoreConfigBuilder {
    pub fn time_representation(mut self, time_representation: TimeRepresentation) -> Self {
        self.time_representation = time_representation;
        self
    }

    pub fn transaction(mut self, transaction: TransactionSettings) -> Self {
        self.transaction = transaction;
        self
    }

    pub fn read_consistency(mut self, read_consistency: ReadConsistency) -> Self {
        self.read_consistency = read_consistency;
        self
    }

    /// Toggle transactional reads.
    pub fn transactional_reads(self, enabled: bool) -> Self {
        self.read_consistency(if enabled {
            ReadConsistency::Transactional
        } else {
            ReadConsistency::Independent
        })
    }

    pub fn query_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(QueryOptions) -> QueryOptions + Send + Sync + 'static,
    {
        self.query_hook = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> StoreConfig {
        StoreConfig {
            time_representation: self.time_representation,
            transaction: self.transaction,
            read_consistency: self.read_consistency,
            query_hook: self.query_hook.unwrap_or_else(|| Arc::new(|options| options)),
        }
    }
}
