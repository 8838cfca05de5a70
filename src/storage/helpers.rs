//! Shared storage helper functions.
//!
//! Version assignment logic used by every backend.

use super::{ExpectedVersion, Result, StoreError};

/// Reject stream ids no backend can key on.
pub fn validate_stream_id(stream_id: &str) -> Result<()> {
    if stream_id.is_empty() {
        return Err(StoreError::InvalidStreamId);
    }
    Ok(())
}

/// Resolve the version of the first event of an append.
///
/// `current` is the version of the stream's last event, `None` for a
/// stream without events.
pub fn next_version(
    stream_id: &str,
    expected: ExpectedVersion,
    current: Option<u64>,
) -> Result<u64> {
    let conflict = || StoreError::ConcurrencyConflict {
        stream_id: stream_id.to_string(),
        expected,
    };

    match (expected, current) {
        (ExpectedVersion::NoStream, None) => Ok(0),
        (ExpectedVersion::NoStream, Some(_)) => Err(conflict()),
        (ExpectedVersion::Exact(v), Some(c)) if v == c => Ok(v + 1),
        (ExpectedVersion::Exact(_), _) => Err(conflict()),
        (ExpectedVersion::Any, Some(c)) => Ok(c + 1),
        (ExpectedVersion::Any, None) => Ok(0),
    }
}

/// Version of the last event after appending `count` events from `first`.
pub fn last_version(first: u64, count: usize, current: Option<u64>) -> Option<u64> {
    match count {
        0 => current,
        n => Some(first + n as u64 - 1),
    }
}
