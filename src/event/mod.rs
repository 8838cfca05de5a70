//! Event envelope types.
//!
//! Events follow the CloudEvents 1.0 attribute model: a required
//! `id`/`source`/`type` triple, optional `time`, `subject` and payload, plus
//! an open set of scalar extension attributes. The store never needs to know
//! concrete domain event types; consumers match on `ty` after decoding.

mod interop;
pub mod format;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};

pub use format::{EventFormat, FormatError, JsonFormat};

/// Attribute names owned by the envelope or by the storage layout.
///
/// Extensions may not reuse them.
pub const RESERVED_ATTRIBUTES: &[&str] = &[
    "specversion",
    "id",
    "source",
    "type",
    "time",
    "subject",
    "datacontenttype",
    "dataschema",
    "data",
    "data_base64",
    "streamid",
    "streamversion",
];

/// Event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    /// Structured JSON content, stored inline.
    Json(serde_json::Value),
    /// Text content.
    String(String),
    /// Opaque bytes, stored base64 encoded.
    Binary(Vec<u8>),
}

/// Scalar value of an extension attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionValue {
    String(String),
    Boolean(bool),
    Integer(i64),
}

impl fmt::Display for ExtensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionValue::String(s) => f.write_str(s),
            ExtensionValue::Boolean(b) => write!(f, "{}", b),
            ExtensionValue::Integer(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for ExtensionValue {
    fn from(value: &str) -> Self {
        ExtensionValue::String(value.to_string())
    }
}

impl From<String> for ExtensionValue {
    fn from(value: String) -> Self {
        ExtensionValue::String(value)
    }
}

impl From<bool> for ExtensionValue {
    fn from(value: bool) -> Self {
        ExtensionValue::Boolean(value)
    }
}

impl From<i64> for ExtensionValue {
    fn from(value: i64) -> Self {
        ExtensionValue::Integer(value)
    }
}

/// Errors raised while building an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("Required attribute '{0}' is empty")]
    EmptyAttribute(&'static str),

    #[error("Invalid extension name '{0}': must be lowercase alphanumeric")]
    InvalidExtensionName(String),

    #[error("Extension name '{0}' is reserved")]
    ReservedExtensionName(String),

    #[error("Payload does not match content type: {0}")]
    MismatchedPayload(String),

    #[error("CloudEvents conversion failed: {0}")]
    CloudEvents(String),
}

/// An immutable domain event envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub source: String,
    pub ty: String,
    pub time: Option<DateTime<FixedOffset>>,
    pub subject: Option<String>,
    pub data_content_type: Option<String>,
    pub data: Option<Data>,
    pub extensions: BTreeMap<String, ExtensionValue>,
}

impl Event {
    /// Start building an event with the given source and type.
    ///
    /// The id defaults to a random UUID unless set with [`EventBuilder::id`].
    pub fn builder(source: impl Into<String>, ty: impl Into<String>) -> EventBuilder {
        EventBuilder::new(source, ty)
    }

    /// Look up an extension attribute.
    pub fn extension(&self, name: &str) -> Option<&ExtensionValue> {
        self.extensions.get(name)
    }
}

/// An event as stored in a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub stream_id: String,
    pub stream_version: u64,
    pub event: Event,
}

/// Builder for [`Event`].
#[derive(Debug, Clone)]
pub struct EventBuilder {
    id: Option<String>,
    source: String,
    ty: String,
    time: Option<DateTime<FixedOffset>>,
    subject: Option<String>,
    data_content_type: Option<String>,
    data: Option<Data>,
    extensions: BTreeMap<String, ExtensionValue>,
}

impl EventBuilder {
    pub fn new(source: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            id: None,
            source: source.into(),
            ty: ty.into(),
            time: None,
            subject: None,
            data_content_type: None,
            data: None,
            extensions: BTreeMap::new(),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the event time. Any timezone offset is kept as given.
    pub fn time<Tz: chrono::TimeZone>(mut self, time: DateTime<Tz>) -> Self {
        self.time = Some(time.fixed_offset());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attach a JSON payload with content type `application/json`.
    pub fn json_data(self, value: serde_json::Value) -> Self {
        self.data("application/json", Data::Json(value))
    }

    pub fn data(mut self, content_type: impl Into<String>, data: Data) -> Self {
        self.data_content_type = Some(content_type.into());
        self.data = Some(data);
        self
    }

    pub fn extension(mut self, name: impl Into<String>, value: impl Into<ExtensionValue>) -> Self {
        self.extensions.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Event, EventError> {
        let id = self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if id.is_empty() {
            return Err(EventError::EmptyAttribute("id"));
        }
        if self.source.is_empty() {
            return Err(EventError::EmptyAttribute("source"));
        }
        if self.ty.is_empty() {
            return Err(EventError::EmptyAttribute("type"));
        }
        for name in self.extensions.keys() {
            validate_extension_name(name)?;
        }
        validate_payload(self.data_content_type.as_deref(), self.data.as_ref())?;

        Ok(Event {
            id,
            source: self.source,
            ty: self.ty,
            time: self.time,
            subject: self.subject,
            data_content_type: self.data_content_type,
            data: self.data,
            extensions: self.extensions,
        })
    }
}

/// Whether a content type means the payload is inlined as JSON.
///
/// A missing content type implies JSON.
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let essence = ct.split(';').next().unwrap_or(ct).trim();
            essence == "application/json" || essence.ends_with("+json") || essence == "text/json"
        }
    }
}

/// Check that a payload survives the JSON structured format unchanged.
///
/// Stored `data` carries no variant tag, so it is read back as
/// [`Data::Json`] under a JSON content type and as [`Data::String`]
/// otherwise, and a JSON `null` reads back as no payload.
pub fn validate_payload(content_type: Option<&str>, data: Option<&Data>) -> Result<(), EventError> {
    let json = is_json_content_type(content_type);
    let shown = content_type.unwrap_or("<none>");
    match data {
        Some(Data::Json(serde_json::Value::Null)) => Err(EventError::MismatchedPayload(
            "JSON null is indistinguishable from no payload".to_string(),
        )),
        Some(Data::Json(_)) if !json => Err(EventError::MismatchedPayload(format!(
            "JSON payload needs a JSON content type, got {}",
            shown
        ))),
        Some(Data::String(_)) if json => Err(EventError::MismatchedPayload(format!(
            "text payload needs a non-JSON content type, got {}",
            shown
        ))),
        _ => Ok(()),
    }
}

/// Check an extension attribute name against the CloudEvents naming rules.
pub fn validate_extension_name(name: &str) -> Result<(), EventError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(EventError::InvalidExtensionName(name.to_string()));
    }
    if RESERVED_ATTRIBUTES.contains(&name) {
        return Err(EventError::ReservedExtensionName(name.to_string()));
    }
    Ok(())
}
