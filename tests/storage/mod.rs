//! Shared storage integration tests.
//!
//! Tests the EventStore and PositionStore interfaces against all implementations.
//! Each implementation module imports these test functions and runs them.

pub mod event_store_tests;
pub mod position_store_tests;
