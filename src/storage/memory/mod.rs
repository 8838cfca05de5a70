//! In-memory storage implementations.
//!
//! Events are kept as codec-encoded documents, exactly as a database
//! backend would store them, so encoding errors and decode paths behave
//! the same. A per-stream version map stands in for the unique
//! `(streamId, streamVersion)` index.

mod event_store;
mod position_store;

pub use event_store::InMemoryEventStore;
pub use position_store::InMemoryPositionStore;
