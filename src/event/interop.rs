//! Conversions between [`Event`] and the cloudevents-sdk event type.
//!
//! The SDK keeps `time` in UTC, so converting into it keeps the instant but
//! not the original offset.

use ::cloudevents::event::{AttributesReader, ExtensionValue as SdkExtensionValue};
use ::cloudevents::{EventBuilder as _, EventBuilderV10};
use chrono::Utc;

use super::{Data, Event, EventError, ExtensionValue};

impl TryFrom<::cloudevents::Event> for Event {
    type Error = EventError;

    fn try_from(sdk: ::cloudevents::Event) -> Result<Self, Self::Error> {
        let mut builder = Event::builder(sdk.source().to_string(), sdk.ty()).id(sdk.id());
        if let Some(time) = sdk.time() {
            builder = builder.time(*time);
        }
        if let Some(subject) = sdk.subject() {
            builder = builder.subject(subject);
        }
        for (name, value) in sdk.iter_extensions() {
            let value = match value {
                SdkExtensionValue::String(s) => ExtensionValue::String(s.clone()),
                SdkExtensionValue::Boolean(b) => ExtensionValue::Boolean(*b),
                SdkExtensionValue::Integer(i) => ExtensionValue::Integer(*i),
            };
            builder = builder.extension(name, value);
        }

        if let Some(data) = sdk.data() {
            let (default_content_type, data) = match data {
                ::cloudevents::Data::Json(value) => ("application/json", Data::Json(value.clone())),
                ::cloudevents::Data::String(text) => ("text/plain", Data::String(text.clone())),
                ::cloudevents::Data::Binary(bytes) => {
                    ("application/octet-stream", Data::Binary(bytes.clone()))
                }
            };
            let content_type = sdk.datacontenttype().unwrap_or(default_content_type);
            builder = builder.data(content_type, data);
        }

        let mut event = builder.build()?;
        if event.data.is_none() {
            event.data_content_type = sdk.datacontenttype().map(str::to_string);
        }
        Ok(event)
    }
}

impl TryFrom<&Event> for ::cloudevents::Event {
    type Error = EventError;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        let mut builder = EventBuilderV10::new()
            .id(event.id.as_str())
            .source(event.source.as_str())
            .ty(event.ty.as_str());
        if let Some(time) = event.time {
            builder = builder.time(time.with_timezone(&Utc));
        }
        if let Some(subject) = &event.subject {
            builder = builder.subject(subject.as_str());
        }
        if let Some(data) = &event.data {
            let (default_content_type, data) = match data {
                Data::Json(value) => ("application/json", ::cloudevents::Data::Json(value.clone())),
                Data::String(text) => ("text/plain", ::cloudevents::Data::String(text.clone())),
                Data::Binary(bytes) => (
                    "application/octet-stream",
                    ::cloudevents::Data::Binary(bytes.clone()),
                ),
            };
            let content_type = event
                .data_content_type
                .clone()
                .unwrap_or_else(|| default_content_type.to_string());
            builder = builder.data(content_type, data);
        }
        for (name, value) in &event.extensions {
            let value = match value {
                ExtensionValue::String(s) => SdkExtensionValue::String(s.clone()),
                ExtensionValue::Boolean(b) => SdkExtensionValue::Boolean(*b),
                ExtensionValue::Integer(i) => SdkExtensionValue::Integer(*i),
            };
            builder = builder.extension(name.as_str(), value);
        }

        builder
            .build()
            .map_err(|e| EventError::CloudEvents(e.to_string()))
    }
}
