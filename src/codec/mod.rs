//! Event <-> storage document mapping.
//!
//! Documents carry the serialized envelope fields at the top level plus
//! `streamId` and `streamVersion`:
//!
//! ```text
//! { specversion, id, source, type, time?, subject?, datacontenttype?,
//!   data | data_base64, streamId, streamVersion, ...extensions }
//! ```
//!
//! With [`TimeRepresentation::NativeDate`] the `time` field is stored as a
//! native BSON date so it can be range-queried. BSON dates are UTC with
//! millisecond resolution, so anything else is rejected at encode time
//! instead of being truncated.

use std::sync::Arc;

use bson::{Bson, Document};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

use crate::config::TimeRepresentation;
use crate::event::{
    validate_payload, Event, EventFormat, FormatError, JsonFormat, StreamEvent,
};

/// Document field holding the stream id.
pub const STREAM_ID: &str = "streamId";
/// Document field holding the stream version.
pub const STREAM_VERSION: &str = "streamVersion";
/// Document field holding the event time.
pub const TIME: &str = "time";
/// Storage-assigned primary key, never part of an event.
pub const INTERNAL_ID: &str = "_id";

/// Errors raised while turning an event into a document.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error(
        "Event time {time} has sub-millisecond precision, which a native date cannot represent; \
         use the RFC 3339 string time representation or truncate the time to milliseconds"
    )]
    SubMillisecondPrecision { time: DateTime<FixedOffset> },

    #[error(
        "Event time {time} is not UTC, and a native date is always UTC; \
         use the RFC 3339 string time representation or convert the time to UTC"
    )]
    NonUtcTimestamp { time: DateTime<FixedOffset> },

    #[error("Stream version {0} exceeds the storable range")]
    VersionOutOfRange(u64),

    #[error("Unsupported payload: {0}")]
    UnsupportedPayload(String),

    #[error("Event serialization failed: {0}")]
    Format(#[from] FormatError),
}

/// Errors raised while turning a stored document back into an event.
#[derive(Debug, thiserror::Error)]
pub enum DecodingError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Event deserialization failed: {0}")]
    Format(#[from] FormatError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Bidirectional event/document mapper for one time representation.
#[derive(Clone)]
pub struct EventCodec {
    format: Arc<dyn EventFormat>,
    time_representation: TimeRepresentation,
}

impl std::fmt::Debug for EventCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCodec")
            .field("time_representation", &self.time_representation)
            .finish_non_exhaustive()
    }
}

impl EventCodec {
    /// Codec using the CloudEvents JSON format.
    pub fn new(time_representation: TimeRepresentation) -> Self {
        Self::with_format(Arc::new(JsonFormat), time_representation)
    }

    pub fn with_format(format: Arc<dyn EventFormat>, time_representation: TimeRepresentation) -> Self {
        Self {
            format,
            time_representation,
        }
    }

    pub fn time_representation(&self) -> TimeRepresentation {
        self.time_representation
    }

    /// Encode an event for storage.
    ///
    /// `stream_version` is `None` for an event whose position has not been
    /// assigned yet; the field is then left out of the document.
    pub fn encode(
        &self,
        event: &Event,
        stream_id: &str,
        stream_version: Option<u64>,
    ) -> Result<Document, EncodingError> {
        validate_payload(event.data_content_type.as_deref(), event.data.as_ref())
            .map_err(|e| EncodingError::UnsupportedPayload(e.to_string()))?;

        let native_time = match (self.time_representation, event.time) {
            (TimeRepresentation::NativeDate, Some(time)) => Some(native_date(time)?),
            _ => None,
        };

        let bytes = self.format.serialize(event)?;
        let json: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| EncodingError::UnsupportedPayload(e.to_string()))?;
        let mut document = bson::to_document(&json)
            .map_err(|e| EncodingError::UnsupportedPayload(e.to_string()))?;

        document.insert(STREAM_ID, stream_id);
        if let Some(version) = stream_version {
            let version =
                i64::try_from(version).map_err(|_| EncodingError::VersionOutOfRange(version))?;
            document.insert(STREAM_VERSION, Bson::Int64(version));
        }
        if let Some(date) = native_time {
            document.insert(TIME, Bson::DateTime(date));
        }

        Ok(document)
    }

    /// Decode a stored document into a stream-qualified event.
    pub fn decode(&self, document: &Document) -> Result<StreamEvent, DecodingError> {
        let mut document = document.clone();
        document.remove(INTERNAL_ID);

        let stream_id = match document.remove(STREAM_ID) {
            Some(Bson::String(id)) => id,
            Some(other) => {
                return Err(DecodingError::InvalidField {
                    field: STREAM_ID,
                    reason: format!("expected a string, got {:?}", other.element_type()),
                })
            }
            None => return Err(DecodingError::MissingField(STREAM_ID)),
        };
        let stream_version = match document.remove(STREAM_VERSION) {
            Some(value) => widen_version(&value)?,
            None => return Err(DecodingError::MissingField(STREAM_VERSION)),
        };

        // Dates are turned back into strings so the format only ever sees one shape.
        if self.time_representation == TimeRepresentation::NativeDate {
            if let Some(Bson::DateTime(date)) = document.get(TIME) {
                let time = rfc3339_from_native(*date)?;
                document.insert(TIME, time);
            }
        }

        let json = Bson::Document(document).into_relaxed_extjson();
        let bytes = serde_json::to_vec(&json)?;
        let event = self.format.deserialize(&bytes)?;

        Ok(StreamEvent {
            stream_id,
            stream_version,
            event,
        })
    }
}

/// Read the stream version of a stored document, if present.
pub fn stream_version_of(document: &Document) -> Result<Option<u64>, DecodingError> {
    document.get(STREAM_VERSION).map(widen_version).transpose()
}

/// Widen a stored version to 64 bits.
///
/// Small versions can come back as 32-bit integers depending on how the
/// document was written, so both widths are accepted.
fn widen_version(value: &Bson) -> Result<u64, DecodingError> {
    let version = match value {
        Bson::Int64(v) => *v,
        Bson::Int32(v) => i64::from(*v),
        other => {
            return Err(DecodingError::InvalidField {
                field: STREAM_VERSION,
                reason: format!("expected an integer, got {:?}", other.element_type()),
            })
        }
    };
    u64::try_from(version).map_err(|_| DecodingError::InvalidField {
        field: STREAM_VERSION,
        reason: format!("negative version {}", version),
    })
}

fn native_date(time: DateTime<FixedOffset>) -> Result<bson::DateTime, EncodingError> {
    if time.timestamp_subsec_nanos() % 1_000_000 != 0 {
        return Err(EncodingError::SubMillisecondPrecision { time });
    }
    if time.offset().local_minus_utc() != 0 {
        return Err(EncodingError::NonUtcTimestamp { time });
    }
    Ok(bson::DateTime::from_millis(time.timestamp_millis()))
}

fn rfc3339_from_native(date: bson::DateTime) -> Result<String, DecodingError> {
    let time = DateTime::<Utc>::from_timestamp_millis(date.timestamp_millis()).ok_or_else(|| {
        DecodingError::InvalidField {
            field: TIME,
            reason: format!("date {} is out of range", date.timestamp_millis()),
        }
    })?;
    Ok(time.to_rfc3339_opts(SecondsFormat::Millis, true))
}
