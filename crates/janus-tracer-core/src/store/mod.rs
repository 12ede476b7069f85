//! Correlation store
//!
//! Two independent in-memory caches:
//!
//! - [`SessionDirectory`]: time-bounded records per session (root trace and
//!   parent span ids), longer lived.
//! - [`PendingCache`]: start events waiting for their end event, LRU bounded
//!   with a maximum age.
//!
//! Expiry is evaluated lazily on access. Neither cache has eviction callbacks.

mod directory;
mod pending;

pub use directory::SessionDirectory;
pub use pending::PendingCache;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default session directory capacity
pub const DEFAULT_DIRECTORY_CAPACITY: usize = 50_000;
/// Default session directory entry lifetime (ms)
pub const DEFAULT_DIRECTORY_TTL_MS: u64 = 60_000;
/// Default pending-pair capacity
pub const DEFAULT_PENDING_CAPACITY: usize = 10_000;
/// Default pending-pair max age (ms)
pub const DEFAULT_PENDING_TTL_MS: u64 = 3_600_000;

/// Per-session directory record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDirectoryEntry {
    pub session_id: String,

    /// Trace id, equal to the session id
    pub trace_id: String,

    /// The session's own root span
    pub root_span_id: String,

    /// Parent for every child span of the session (the root span)
    pub parent_span_id: String,

    /// Creation timestamp of the session
    pub created_at: u64,
}

impl SessionDirectoryEntry {
    pub fn new(session_id: &str, root_span_id: &str, created_at: u64) -> Self {
        Self {
            session_id: session_id.to_string(),
            trace_id: session_id.to_string(),
            root_span_id: root_span_id.to_string(),
            parent_span_id: root_span_id.to_string(),
            created_at,
        }
    }
}

/// A start event retained until its paired end event arrives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSpan {
    /// Correlation key this entry is stored under
    pub key: String,

    /// Human readable name of the eventual span
    pub name: String,

    /// Start sub-event (e.g. "joined")
    pub event: String,

    pub span_id: String,
    pub trace_id: String,
    pub parent_id: Option<String>,

    /// Start time
    pub timestamp: u64,

    pub session_id: String,
    pub display: Option<String>,
    pub room: Option<String>,

    /// Tags of the start event, carried onto the completed span
    pub tags: BTreeMap<String, String>,
}

/// Correlation key builders.
///
/// The prefixes namespace otherwise overlapping id spaces so attach, join,
/// publish and subscribe flows of one session never collide.
pub mod keys {
    pub fn session(session_id: &str) -> String {
        session_id.to_string()
    }

    pub fn attachment(session_id: &str) -> String {
        format!("att_{}", session_id)
    }

    pub fn join(participant_id: &str) -> String {
        format!("join_{}", participant_id)
    }

    pub fn publish(participant_id: &str) -> String {
        format!("pub_{}", participant_id)
    }

    pub fn subscribe(session_id: &str) -> String {
        format!("sub_{}", session_id)
    }
}
