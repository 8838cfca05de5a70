//! Event serialization formats.
//!
//! The codec treats a format as an opaque byte transform. [`JsonFormat`]
//! implements the CloudEvents JSON structured format.

use base64::Engine;
use chrono::{DateTime, SecondsFormat};
use serde_json::{Map, Value};

use super::{is_json_content_type, Data, Event, ExtensionValue};

/// CloudEvents spec version written by [`JsonFormat`].
pub const SPEC_VERSION: &str = "1.0";

/// Errors raised by an [`EventFormat`].
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialized event is not a JSON object")]
    NotAnObject,

    #[error("Missing required attribute '{0}'")]
    MissingAttribute(&'static str),

    #[error("Invalid attribute '{name}': {reason}")]
    InvalidAttribute { name: String, reason: String },

    #[error("Unsupported specversion '{0}'")]
    UnsupportedSpecVersion(String),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Serializer/deserializer for the event envelope and payload.
pub trait EventFormat: Send + Sync {
    fn serialize(&self, event: &Event) -> Result<Vec<u8>, FormatError>;

    fn deserialize(&self, bytes: &[u8]) -> Result<Event, FormatError>;
}

/// CloudEvents JSON structured format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl EventFormat for JsonFormat {
    fn serialize(&self, event: &Event) -> Result<Vec<u8>, FormatError> {
        let mut object = Map::new();
        object.insert("specversion".into(), Value::from(SPEC_VERSION));
        object.insert("id".into(), Value::from(event.id.as_str()));
        object.insert("source".into(), Value::from(event.source.as_str()));
        object.insert("type".into(), Value::from(event.ty.as_str()));
        if let Some(time) = &event.time {
            // Written with the event's own offset; converting to UTC first would drop it.
            // Always nine fraction digits, so stored strings of one offset sort by time.
            object.insert(
                "time".into(),
                Value::from(time.to_rfc3339_opts(SecondsFormat::Nanos, true)),
            );
        }
        if let Some(subject) = &event.subject {
            object.insert("subject".into(), Value::from(subject.as_str()));
        }
        if let Some(content_type) = &event.data_content_type {
            object.insert("datacontenttype".into(), Value::from(content_type.as_str()));
        }
        match &event.data {
            Some(Data::Json(value)) => {
                object.insert("data".into(), value.clone());
            }
            Some(Data::String(text)) => {
                object.insert("data".into(), Value::from(text.as_str()));
            }
            Some(Data::Binary(bytes)) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                object.insert("data_base64".into(), Value::from(encoded));
            }
            None => {}
        }
        for (name, value) in &event.extensions {
            let value = match value {
                ExtensionValue::String(s) => Value::from(s.as_str()),
                ExtensionValue::Boolean(b) => Value::from(*b),
                ExtensionValue::Integer(i) => Value::from(*i),
            };
            object.insert(name.clone(), value);
        }

        Ok(serde_json::to_vec(&Value::Object(object))?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Event, FormatError> {
        let Value::Object(mut object) = serde_json::from_slice::<Value>(bytes)? else {
            return Err(FormatError::NotAnObject);
        };

        if let Some(version) = object.remove("specversion") {
            match version.as_str() {
                Some(SPEC_VERSION) => {}
                _ => return Err(FormatError::UnsupportedSpecVersion(version.to_string())),
            }
        }

        let id = take_required_string(&mut object, "id")?;
        let source = take_required_string(&mut object, "source")?;
        let ty = take_required_string(&mut object, "type")?;
        let time = take_optional_string(&mut object, "time")?
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw).map_err(|e| FormatError::InvalidAttribute {
                    name: "time".to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        let subject = take_optional_string(&mut object, "subject")?;
        let data_content_type = take_optional_string(&mut object, "datacontenttype")?;

        let data = if let Some(encoded) = take_optional_string(&mut object, "data_base64")? {
            Some(Data::Binary(
                base64::engine::general_purpose::STANDARD.decode(encoded)?,
            ))
        } else {
            match object.remove("data") {
                None | Some(Value::Null) => None,
                Some(Value::String(text)) if !is_json_content_type(data_content_type.as_deref()) => {
                    Some(Data::String(text))
                }
                Some(value) => Some(Data::Json(value)),
            }
        };

        let mut extensions = std::collections::BTreeMap::new();
        for (name, value) in object {
            let value = match value {
                Value::String(s) => ExtensionValue::String(s),
                Value::Bool(b) => ExtensionValue::Boolean(b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => ExtensionValue::Integer(i),
                    None => {
                        return Err(FormatError::InvalidAttribute {
                            name,
                            reason: format!("extension value {} is not a 64-bit integer", n),
                        })
                    }
                },
                other => {
                    return Err(FormatError::InvalidAttribute {
                        name,
                        reason: format!("extension value {} is not a scalar", other),
                    })
                }
            };
            extensions.insert(name, value);
        }

        Ok(Event {
            id,
            source,
            ty,
            time,
            subject,
            data_content_type,
            data,
            extensions,
        })
    }
}

fn take_required_string(
    object: &mut Map<String, Value>,
    name: &'static str,
) -> Result<String, FormatError> {
    take_optional_string(object, name)?.ok_or(FormatError::MissingAttribute(name))
}

fn take_optional_string(
    object: &mut Map<String, Value>,
    name: &'static str,
) -> Result<Option<String>, FormatError> {
    match object.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(FormatError::InvalidAttribute {
            name: name.to_string(),
            reason: format!("expected a string, got {}", other),
        }),
    }
}
