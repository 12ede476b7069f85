//! Span model and trace helpers
//!
//! Spans are produced by the [`crate::engine::TraceEngine`] and handed to an
//! exporter. They are self-contained once emitted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Duration carried by marker spans (events with no measured end)
pub const MARKER_DURATION: u64 = 1000;

/// Width of the padded timestamp representation
const TIMESTAMP_DIGITS: u32 = 16;

/// A finished span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Span ID
    pub span_id: String,

    /// Trace ID (the Janus session id)
    pub trace_id: String,

    /// Parent span ID, absent only for a session's root span
    pub parent_id: Option<String>,

    /// Human readable name (e.g. "Destroyed 1234")
    pub name: String,

    /// Sub-event that produced the span (e.g. "destroyed")
    pub event: String,

    /// Start time
    pub timestamp: u64,

    /// Duration, in the same unit as `timestamp`
    pub duration: u64,

    /// Span tags
    pub tags: BTreeMap<String, String>,
}

/// Generate a fresh span id: 16 lowercase hex digits
pub fn new_span_id() -> String {
    let (high, low) = uuid::Uuid::new_v4().as_u64_pair();
    let id = if high == 0 { low | 1 } else { high };
    format!("{:016x}", id)
}

/// Right-pad a timestamp with zeros to 16 digits.
///
/// Millisecond epoch values (13 digits) become microsecond-like values;
/// Janus' own microsecond timestamps pass through unchanged.
pub fn expand_timestamp(ts: u64) -> u64 {
    if ts == 0 {
        return 0;
    }
    let digits = ts.ilog10() + 1;
    if digits >= TIMESTAMP_DIGITS {
        ts
    } else {
        ts.saturating_mul(10u64.pow(TIMESTAMP_DIGITS - digits))
    }
}

/// Current wall-clock time in the padded representation
pub fn now_timestamp() -> u64 {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    expand_timestamp(millis)
}

/// Duration between two event timestamps, never negative.
///
/// Janus stamps events in microseconds, the same unit as the expanded wire
/// timestamp. Inputs in any other unit give durations in that unit.
pub fn duration_between(start: u64, end: u64) -> u64 {
    end.saturating_sub(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_timestamp() {
        assert_eq!(expand_timestamp(1_650_000_000_123), 1_650_000_000_123_000);
        assert_eq!(expand_timestamp(1_650_000_000_123_456), 1_650_000_000_123_456);
        assert_eq!(expand_timestamp(1000), 1_000_000_000_000_000);
        assert_eq!(expand_timestamp(0), 0);
        assert_eq!(expand_timestamp(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_now_timestamp_is_padded() {
        let now = now_timestamp();
        assert_eq!(now.ilog10() + 1, 16);
    }

    #[test]
    fn test_new_span_id() {
        let a = new_span_id();
        let b = new_span_id();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_ne!(a, "0000000000000000");
    }

    #[test]
    fn test_duration_between() {
        assert_eq!(duration_between(1000, 5000), 4000);
        assert_eq!(duration_between(5000, 1000), 0);

        // microsecond stamps are already wire-width, so the unit carries over
        let (start, end) = (1_650_000_000_123_456, 1_650_000_002_123_456);
        assert_eq!(expand_timestamp(start), start);
        assert_eq!(duration_between(start, end), 2_000_000);
    }
}
