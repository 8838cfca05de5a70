//! Strand - event-sourcing store
//!
//! Append-only event streams with optimistic concurrency, a canonical
//! document encoding for CloudEvents-style events, and change
//! subscriptions with durable, at-least-once resume positions.
//!
//! Backends: in-memory (always) and MongoDB (feature `mongodb`).

pub mod codec;
pub mod config;
pub mod event;
pub mod storage;
pub mod subscription;
pub mod utils;

pub use codec::{DecodingError, EncodingError, EventCodec};
pub use config::{ReadConsistency, Settings, StoreConfig, TimeRepresentation};
pub use event::{Data, Event, EventBuilder, ExtensionValue, StreamEvent};
pub use storage::{
    init_storage, AppendResult, ChangeFeed, EventStore, EventStream, ExpectedVersion,
    PositionStore, SaveOutcome, Storage, StoreError, SubscriptionPosition,
};
pub use subscription::{ChangeSubscriber, EventHandler, HandlerError, StartAt, SubscriptionError};
