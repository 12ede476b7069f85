//! Event classifier
//!
//! Normalizes a decoded Janus event into a [`ClassifiedEvent`]. Stateless.
//! Ignored categories yield `Ok(None)`; structurally incomplete payloads
//! yield an error so the caller can count and drop them.

use super::{
    AttachmentAction, ClassifiedEvent, EventCategory, EventKind, RoomAction, RoomEvent,
    SessionAction,
};
use crate::trace::now_timestamp;
use serde_json::Value;
use thiserror::Error;

/// Classification error
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Event is not a JSON object")]
    NotAnObject,

    #[error("Missing event type")]
    MissingType,

    #[error("Missing field `{field}` in type {type_code} event")]
    MissingField {
        type_code: u64,
        field: &'static str,
    },
}

/// Decode a JSON line and classify it
pub fn classify_line(line: &str) -> Result<Option<ClassifiedEvent>, ClassifyError> {
    let value: Value = serde_json::from_str(line)?;
    classify(&value)
}

/// Classify a decoded Janus event
pub fn classify(raw: &Value) -> Result<Option<ClassifiedEvent>, ClassifyError> {
    let obj = raw.as_object().ok_or(ClassifyError::NotAnObject)?;
    let type_code = obj
        .get("type")
        .and_then(Value::as_u64)
        .ok_or(ClassifyError::MissingType)?;

    let Some(category) = EventCategory::from_type_code(type_code) else {
        // heartbeat-ish categories (jsep, webrtc, media, transport, core)
        return Ok(None);
    };

    let missing = |field| ClassifyError::MissingField { type_code, field };

    let session_id = obj
        .get("session_id")
        .and_then(id_string)
        .ok_or_else(|| missing("session_id"))?;
    let event = obj.get("event").ok_or_else(|| missing("event"))?;
    let timestamp = obj
        .get("timestamp")
        .and_then(timestamp_value)
        .unwrap_or_else(now_timestamp);

    let kind = match category {
        EventCategory::SessionLifecycle => {
            let name = event_name(event).ok_or_else(|| missing("event.name"))?;
            EventKind::Session(SessionAction::parse(name))
        }
        EventCategory::Attachment => {
            let name = event_name(event).ok_or_else(|| missing("event.name"))?;
            EventKind::Attachment(AttachmentAction::parse(name))
        }
        EventCategory::RoomParticipant => {
            let data = event
                .get("data")
                .filter(|d| d.is_object())
                .ok_or_else(|| missing("event.data"))?;
            let sub_event = data
                .get("event")
                .and_then(Value::as_str)
                .ok_or_else(|| missing("event.data.event"))?;
            let participant = || {
                data.get("id")
                    .and_then(id_string)
                    .ok_or_else(|| missing("event.data.id"))
            };

            let action = match sub_event {
                "joined" => RoomAction::Joined {
                    participant: participant()?,
                },
                "configured" => RoomAction::Configured {
                    participant: participant()?,
                },
                "published" => RoomAction::Published {
                    participant: participant()?,
                },
                "unpublished" => RoomAction::Unpublished {
                    participant: participant()?,
                },
                "leaving" => RoomAction::Leaving {
                    participant: participant()?,
                },
                "subscribing" => RoomAction::Subscribing,
                "subscribed" => RoomAction::Subscribed,
                "updated" => RoomAction::Updated,
                other => RoomAction::Other(other.to_string()),
            };

            EventKind::Room(RoomEvent {
                action,
                room: data.get("room").and_then(id_string),
                display: data
                    .get("display")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                plugin: event
                    .get("plugin")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        }
    };

    Ok(Some(ClassifiedEvent {
        session_id,
        timestamp,
        kind,
        raw: raw.clone(),
    }))
}

fn event_name(event: &Value) -> Option<&str> {
    event.get("name").and_then(Value::as_str)
}

/// Janus identifiers are usually 64-bit integers, but string ids are allowed
/// by configuration (`string_ids = true`)
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .filter(|ts| *ts > 0)
}
