//! Janus event types
//!
//! Raw Janus event-handler payloads are classified once into a typed
//! [`ClassifiedEvent`]. Everything downstream matches on [`EventKind`]
//! instead of probing optional JSON fields.

pub mod classify;

pub use classify::{classify, classify_line, ClassifyError};

use serde::{Deserialize, Serialize};

/// Janus event handler type codes
pub mod event_type {
    /// Session created/destroyed/timeout
    pub const SESSION: u64 = 1;
    /// Handle attached/detached
    pub const HANDLE: u64 = 2;
    /// JSEP offer/answer
    pub const JSEP: u64 = 8;
    /// WebRTC state (ICE, DTLS, ...)
    pub const WEBRTC: u64 = 16;
    /// Media state
    pub const MEDIA: u64 = 32;
    /// Plugin-originated event (videoroom join/leave/publish/...)
    pub const PLUGIN: u64 = 64;
    /// Transport-originated event
    pub const TRANSPORT: u64 = 128;
}

/// Event categories that take part in tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    SessionLifecycle,
    Attachment,
    RoomParticipant,
}

impl EventCategory {
    /// Map a Janus type code to a traced category
    pub fn from_type_code(code: u64) -> Option<Self> {
        match code {
            event_type::SESSION => Some(EventCategory::SessionLifecycle),
            event_type::HANDLE => Some(EventCategory::Attachment),
            event_type::PLUGIN => Some(EventCategory::RoomParticipant),
            _ => None,
        }
    }
}

/// A raw event classified by category and sub-event
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEvent {
    /// Janus session the event belongs to
    pub session_id: String,

    /// Event time (microsecond-like, see [`crate::trace::expand_timestamp`])
    pub timestamp: u64,

    /// Category-specific payload
    pub kind: EventKind,

    /// The decoded payload as received
    pub raw: serde_json::Value,
}

impl ClassifiedEvent {
    pub fn category(&self) -> EventCategory {
        match self.kind {
            EventKind::Session(_) => EventCategory::SessionLifecycle,
            EventKind::Attachment(_) => EventCategory::Attachment,
            EventKind::Room(_) => EventCategory::RoomParticipant,
        }
    }

    /// The sub-event name as it appears on the wire
    pub fn sub_event(&self) -> &str {
        match &self.kind {
            EventKind::Session(action) => action.as_str(),
            EventKind::Attachment(action) => action.as_str(),
            EventKind::Room(room) => room.action.as_str(),
        }
    }
}

/// Category-specific event payload
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Session(SessionAction),
    Attachment(AttachmentAction),
    Room(RoomEvent),
}

/// Type 1 sub-events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    Created,
    Destroyed,
    Other(String),
}

impl SessionAction {
    pub fn parse(name: &str) -> Self {
        match name {
            "created" => SessionAction::Created,
            "destroyed" => SessionAction::Destroyed,
            other => SessionAction::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SessionAction::Created => "created",
            SessionAction::Destroyed => "destroyed",
            SessionAction::Other(name) => name,
        }
    }
}

/// Type 2 sub-events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentAction {
    Attached,
    Detached,
    Other(String),
}

impl AttachmentAction {
    pub fn parse(name: &str) -> Self {
        match name {
            "attached" => AttachmentAction::Attached,
            "detached" => AttachmentAction::Detached,
            other => AttachmentAction::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AttachmentAction::Attached => "attached",
            AttachmentAction::Detached => "detached",
            AttachmentAction::Other(name) => name,
        }
    }
}

/// Type 64 (videoroom) event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomEvent {
    pub action: RoomAction,

    /// Room identifier
    pub room: Option<String>,

    /// Participant display name
    pub display: Option<String>,

    /// Originating plugin package (e.g. `janus.plugin.videoroom`)
    pub plugin: Option<String>,
}

impl RoomEvent {
    /// Room label used in span names
    pub fn room_label(&self) -> &str {
        self.room.as_deref().unwrap_or("unknown")
    }
}

/// Videoroom sub-events.
///
/// Variants correlated by participant carry the participant id; the
/// subscriber-side variants correlate by session and carry nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomAction {
    Joined { participant: String },
    Configured { participant: String },
    Published { participant: String },
    Subscribing,
    Subscribed,
    Updated,
    Unpublished { participant: String },
    Leaving { participant: String },
    Other(String),
}

impl RoomAction {
    pub fn as_str(&self) -> &str {
        match self {
            RoomAction::Joined { .. } => "joined",
            RoomAction::Configured { .. } => "configured",
            RoomAction::Published { .. } => "published",
            RoomAction::Subscribing => "subscribing",
            RoomAction::Subscribed => "subscribed",
            RoomAction::Updated => "updated",
            RoomAction::Unpublished { .. } => "unpublished",
            RoomAction::Leaving { .. } => "leaving",
            RoomAction::Other(name) => name,
        }
    }

    /// Participant id for participant-keyed actions
    pub fn participant(&self) -> Option<&str> {
        match self {
            RoomAction::Joined { participant }
            | RoomAction::Configured { participant }
            | RoomAction::Published { participant }
            | RoomAction::Unpublished { participant }
            | RoomAction::Leaving { participant } => Some(participant),
            _ => None,
        }
    }
}
