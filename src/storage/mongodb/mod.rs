//! MongoDB implementations of storage interfaces.
//!
//! Appends and transactional reads use multi-document transactions, and
//! the change feed is a change stream, so the server must run as a
//! replica set.

mod change_feed;
mod event_store;
mod position_store;

pub use event_store::MongoEventStore;
pub use position_store::MongoPositionStore;

use mongodb::error::{Error, ErrorKind, WriteFailure};
use mongodb::options::{Acknowledgment, ReadConcern, TransactionOptions, WriteConcern};

use crate::config::{ReadConcernLevel, TransactionSettings, WriteAcknowledgment};

/// Default collection names.
pub const EVENTS_COLLECTION: &str = "events";
pub const POSITIONS_COLLECTION: &str = "subscription_positions";

const DUPLICATE_KEY: i32 = 11000;
const WRITE_CONFLICT: i32 = 112;

/// Whether an error means another writer got there first.
pub(crate) fn is_conflict(error: &Error) -> bool {
    match &*error.kind {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::InsertMany(e) => e
            .write_errors
            .as_ref()
            .is_some_and(|errors| errors.iter().any(|e| e.code == DUPLICATE_KEY)),
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY || e.code == WRITE_CONFLICT,
        _ => false,
    }
}

pub(crate) fn is_duplicate_key(error: &Error) -> bool {
    match &*error.kind {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Driver transaction options for the configured settings.
///
/// `fallback_read_concern` applies when none is configured.
pub(crate) fn transaction_options(
    settings: &TransactionSettings,
    fallback_read_concern: Option<ReadConcernLevel>,
) -> TransactionOptions {
    let mut options = TransactionOptions::default();

    options.read_concern = settings
        .read_concern
        .or(fallback_read_concern)
        .map(|level| match level {
            ReadConcernLevel::Local => ReadConcern::local(),
            ReadConcernLevel::Majority => ReadConcern::majority(),
            ReadConcernLevel::Snapshot => ReadConcern::snapshot(),
        });

    if settings.write_concern.is_some() || settings.journal.is_some() {
        let mut write_concern = WriteConcern::default();
        write_concern.w = settings.write_concern.map(|w| match w {
            WriteAcknowledgment::Majority => Acknowledgment::Majority,
            WriteAcknowledgment::Nodes(n) => Acknowledgment::Nodes(n),
        });
        write_concern.journal = settings.journal;
        options.write_concern = Some(write_concern);
    }

    options.max_commit_time = settings
        .max_commit_time_ms
        .map(std::time::Duration::from_millis);

    options
}
