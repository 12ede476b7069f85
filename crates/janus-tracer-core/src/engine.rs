//! Span synthesis engine
//!
//! One state machine per event category. Start events are parked in the
//! [`PendingCache`] under a prefixed correlation key; the matching end event
//! takes the entry back out and emits a completed span plus a marker span.
//! An end event whose start is unknown (never seen, evicted, or already
//! consumed) emits nothing and leaves the store untouched.

use crate::events::{
    AttachmentAction, ClassifiedEvent, ClassifyError, EventKind, RoomAction, RoomEvent,
    SessionAction,
};
use crate::metrics::SharedMetrics;
use crate::store::{
    keys, PendingCache, PendingSpan, SessionDirectory, SessionDirectoryEntry,
    DEFAULT_DIRECTORY_CAPACITY, DEFAULT_DIRECTORY_TTL_MS, DEFAULT_PENDING_CAPACITY,
    DEFAULT_PENDING_TTL_MS,
};
use crate::trace::{duration_between, new_span_id, Span, MARKER_DURATION};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Display name used when a participant has none
const NO_DISPLAY: &str = "null";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Session directory capacity
    pub directory_capacity: usize,

    /// Session directory entry lifetime
    pub directory_ttl: Duration,

    /// Pending-pair capacity
    pub pending_capacity: usize,

    /// Pending-pair max age
    pub pending_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            directory_capacity: DEFAULT_DIRECTORY_CAPACITY,
            directory_ttl: Duration::from_millis(DEFAULT_DIRECTORY_TTL_MS),
            pending_capacity: DEFAULT_PENDING_CAPACITY,
            pending_ttl: Duration::from_millis(DEFAULT_PENDING_TTL_MS),
        }
    }
}

/// Correlates classified events into spans
pub struct TraceEngine {
    directory: SessionDirectory<SessionDirectoryEntry>,
    pending: PendingCache,
    metrics: Option<SharedMetrics>,
}

impl TraceEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            directory: SessionDirectory::new(config.directory_capacity, config.directory_ttl),
            pending: PendingCache::new(config.pending_capacity, config.pending_ttl),
            metrics: None,
        }
    }

    /// Attach a metrics collector for session/participant counters
    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.set_metrics(metrics);
        self
    }

    pub fn set_metrics(&mut self, metrics: SharedMetrics) {
        self.metrics = Some(metrics);
    }

    pub fn directory(&mut self) -> &mut SessionDirectory<SessionDirectoryEntry> {
        &mut self.directory
    }

    pub fn pending(&mut self) -> &mut PendingCache {
        &mut self.pending
    }

    /// Classify a decoded event and handle it
    pub fn handle_value(&mut self, raw: &serde_json::Value) -> Result<Vec<Span>, ClassifyError> {
        Ok(match crate::events::classify(raw)? {
            Some(event) => self.handle(&event),
            None => Vec::new(),
        })
    }

    /// Handle one classified event, returning the spans it completes
    pub fn handle(&mut self, event: &ClassifiedEvent) -> Vec<Span> {
        if let Some(metrics) = &self.metrics {
            metrics.record_classified(event.sub_event());
        }

        match &event.kind {
            EventKind::Session(action) => self.handle_session(event, action),
            EventKind::Attachment(action) => self.handle_attachment(event, action),
            EventKind::Room(room) => self.handle_room(event, room),
        }
    }

    fn handle_session(&mut self, event: &ClassifiedEvent, action: &SessionAction) -> Vec<Span> {
        let sid = &event.session_id;
        match action {
            SessionAction::Created => {
                let span_id = new_span_id();
                let key = keys::session(sid);
                self.pending.set(
                    &key,
                    PendingSpan {
                        key: key.clone(),
                        name: format!("Session {}", sid),
                        event: action.as_str().to_string(),
                        span_id: span_id.clone(),
                        trace_id: sid.clone(),
                        parent_id: None,
                        timestamp: event.timestamp,
                        session_id: sid.clone(),
                        display: None,
                        room: None,
                        tags: event_tags(event),
                    },
                );
                self.directory.add(
                    sid,
                    SessionDirectoryEntry::new(sid, &span_id, event.timestamp),
                );
                if let Some(metrics) = &self.metrics {
                    metrics.session_opened();
                }
                debug!("Session {} created, root span {}", sid, span_id);
                Vec::new()
            }
            SessionAction::Destroyed => {
                let Some(created) = self.pending.take(&keys::session(sid)) else {
                    warn!("Session {} destroyed without a tracked creation", sid);
                    return Vec::new();
                };
                self.directory.remove(sid);
                if let Some(metrics) = &self.metrics {
                    metrics.session_closed();
                }

                let name = created.name.clone();
                let completed = complete(created, name, event.timestamp);
                let marker = marker(
                    event,
                    sid.clone(),
                    Some(completed.span_id.clone()),
                    format!("Destroyed {}", sid),
                );
                vec![completed, marker]
            }
            SessionAction::Other(name) => {
                trace!("Ignoring session event {} for {}", name, sid);
                Vec::new()
            }
        }
    }

    fn handle_attachment(
        &mut self,
        event: &ClassifiedEvent,
        action: &AttachmentAction,
    ) -> Vec<Span> {
        let sid = &event.session_id;
        let key = keys::attachment(sid);
        match action {
            AttachmentAction::Attached => {
                let parent = self.parent_for(sid);
                self.pending.set(
                    &key,
                    PendingSpan {
                        key: key.clone(),
                        name: format!("Attached {}", sid),
                        event: action.as_str().to_string(),
                        span_id: new_span_id(),
                        trace_id: sid.clone(),
                        parent_id: Some(parent),
                        timestamp: event.timestamp,
                        session_id: sid.clone(),
                        display: None,
                        room: None,
                        tags: event_tags(event),
                    },
                );
                Vec::new()
            }
            AttachmentAction::Detached => {
                // detaches without a traced attach are routine (cache expiry)
                let Some(attached) = self.pending.take(&key) else {
                    debug!("Detach for {} without a tracked attach", sid);
                    return Vec::new();
                };

                let name = attached.name.clone();
                let completed = complete(attached, name, event.timestamp);
                let marker = marker(
                    event,
                    sid.clone(),
                    Some(completed.span_id.clone()),
                    format!("Detached {}", sid),
                );
                vec![completed, marker]
            }
            AttachmentAction::Other(name) => {
                trace!("Ignoring handle event {} for {}", name, sid);
                Vec::new()
            }
        }
    }

    fn handle_room(&mut self, event: &ClassifiedEvent, room: &RoomEvent) -> Vec<Span> {
        let sid = &event.session_id;
        let room_label = room.room_label();

        match &room.action {
            RoomAction::Joined { participant } => {
                let key = keys::join(participant);
                let parent = self.parent_for(sid);
                let display = room.display.clone().unwrap_or_else(|| NO_DISPLAY.into());
                self.pending.set(
                    &key,
                    PendingSpan {
                        key: key.clone(),
                        name: format!(
                            "User {} / Display Name: {}, Room {}",
                            participant, display, room_label
                        ),
                        event: room.action.as_str().to_string(),
                        span_id: new_span_id(),
                        trace_id: sid.clone(),
                        parent_id: Some(parent),
                        timestamp: event.timestamp,
                        session_id: sid.clone(),
                        display: Some(display),
                        room: room.room.clone(),
                        tags: event_tags(event),
                    },
                );
                if let Some(metrics) = &self.metrics {
                    metrics.participant_joined();
                }
                Vec::new()
            }
            RoomAction::Configured { participant } => {
                let parent = self.parent_for(sid);
                // the join entry stays in place as the anchor until leaving
                let Some(joined_at) = self
                    .pending
                    .get(&keys::join(participant))
                    .map(|joined| joined.timestamp)
                else {
                    debug!("Configured {} without a tracked join", participant);
                    return Vec::new();
                };

                vec![Span {
                    span_id: new_span_id(),
                    trace_id: sid.clone(),
                    parent_id: Some(parent),
                    name: format!("Configured {}, Room {}", participant, room_label),
                    event: room.action.as_str().to_string(),
                    timestamp: joined_at,
                    duration: duration_between(joined_at, event.timestamp),
                    tags: event_tags(event),
                }]
            }
            RoomAction::Published { participant } => {
                let key = keys::publish(participant);
                let parent = self.parent_for(sid);
                self.pending.set(
                    &key,
                    PendingSpan {
                        key: key.clone(),
                        name: format!("Published {}", participant),
                        event: room.action.as_str().to_string(),
                        span_id: new_span_id(),
                        trace_id: sid.clone(),
                        parent_id: Some(parent),
                        timestamp: event.timestamp,
                        session_id: sid.clone(),
                        display: room.display.clone(),
                        room: room.room.clone(),
                        tags: event_tags(event),
                    },
                );
                Vec::new()
            }
            RoomAction::Subscribing => {
                let key = keys::subscribe(sid);
                let parent = self.parent_for(sid);
                self.pending.set(
                    &key,
                    PendingSpan {
                        key: key.clone(),
                        name: format!("Subscribed {}", sid),
                        event: room.action.as_str().to_string(),
                        span_id: new_span_id(),
                        trace_id: sid.clone(),
                        parent_id: Some(parent),
                        timestamp: event.timestamp,
                        session_id: sid.clone(),
                        display: None,
                        room: room.room.clone(),
                        tags: event_tags(event),
                    },
                );
                Vec::new()
            }
            RoomAction::Subscribed => {
                let Some(subscribing) = self.pending.take(&keys::subscribe(sid)) else {
                    warn!("Subscribed {} without a tracked subscribing", sid);
                    return Vec::new();
                };

                let room_label = label_for(room, &subscribing);
                let parent = subscribing.parent_id.clone();
                let completed = complete(
                    subscribing,
                    format!("Subscribed {}, Room {}", sid, room_label),
                    event.timestamp,
                );
                let marker = marker(
                    event,
                    sid.clone(),
                    parent,
                    format!("Subscription confirmed {}, Room {}", sid, room_label),
                );
                vec![completed, marker]
            }
            RoomAction::Updated => {
                let parent = self.parent_for(sid);
                vec![marker(
                    event,
                    sid.clone(),
                    Some(parent),
                    format!("Updated {}, Room {}", sid, room_label),
                )]
            }
            RoomAction::Unpublished { participant } => {
                // publish/unpublish pairing is best effort
                let Some(published) = self.pending.take(&keys::publish(participant)) else {
                    debug!("Unpublished {} without a tracked publish", participant);
                    return Vec::new();
                };

                let room_label = label_for(room, &published);
                let display = published
                    .display
                    .clone()
                    .unwrap_or_else(|| NO_DISPLAY.into());
                let trace_id = published.trace_id.clone();
                let parent = published.parent_id.clone();
                let completed = complete(
                    published,
                    format!(
                        "Published {} / Display Name: {}, Room {}",
                        participant, display, room_label
                    ),
                    event.timestamp,
                );
                let marker = marker(
                    event,
                    trace_id,
                    parent,
                    format!(
                        "Unpublished {} / Display Name: {}, Room {}",
                        participant, display, room_label
                    ),
                );
                vec![completed, marker]
            }
            RoomAction::Leaving { participant } => {
                let Some(joined) = self.pending.take(&keys::join(participant)) else {
                    debug!("Leaving {} without a tracked join", participant);
                    return Vec::new();
                };
                if let Some(metrics) = &self.metrics {
                    metrics.participant_left();
                }

                let room_label = label_for(room, &joined);
                let display = joined
                    .display
                    .clone()
                    .unwrap_or_else(|| NO_DISPLAY.into());
                let trace_id = joined.trace_id.clone();
                let parent = joined.parent_id.clone();
                let completed = complete(
                    joined,
                    format!(
                        "User {} / Display Name: {}, Room {}",
                        participant, display, room_label
                    ),
                    event.timestamp,
                );
                let marker = marker(
                    event,
                    trace_id,
                    parent,
                    format!(
                        "User {} leaving / Display Name: {}, Room {}",
                        participant, display, room_label
                    ),
                );
                vec![completed, marker]
            }
            RoomAction::Other(name) => {
                trace!("Ignoring room event {} for {}", name, sid);
                Vec::new()
            }
        }
    }

    /// Parent span for children of `session_id`.
    ///
    /// Sessions and attachments are not strictly ordered in the stream, so a
    /// missing directory entry falls back to a fresh id.
    fn parent_for(&mut self, session_id: &str) -> String {
        self.directory
            .latest(session_id)
            .map(|entry| entry.parent_span_id)
            .unwrap_or_else(new_span_id)
    }
}

impl Default for TraceEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Room label of an end event, falling back to the room seen at start
fn label_for(room: &RoomEvent, start: &PendingSpan) -> String {
    room.room
        .as_deref()
        .or(start.room.as_deref())
        .unwrap_or(room.room_label())
        .to_string()
}

/// Close a pending start event at `end`
fn complete(start: PendingSpan, name: String, end: u64) -> Span {
    Span {
        duration: duration_between(start.timestamp, end),
        span_id: start.span_id,
        trace_id: start.trace_id,
        parent_id: start.parent_id,
        name,
        event: start.event,
        timestamp: start.timestamp,
        tags: start.tags,
    }
}

/// Instantaneous span for `event`
fn marker(
    event: &ClassifiedEvent,
    trace_id: String,
    parent_id: Option<String>,
    name: String,
) -> Span {
    Span {
        span_id: new_span_id(),
        trace_id,
        parent_id,
        name,
        event: event.sub_event().to_string(),
        timestamp: event.timestamp,
        duration: MARKER_DURATION,
        tags: event_tags(event),
    }
}

fn event_tags(event: &ClassifiedEvent) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert("session_id".to_string(), event.session_id.clone());
    tags.insert("event".to_string(), event.sub_event().to_string());

    if let EventKind::Room(room) = &event.kind {
        if let Some(participant) = room.action.participant() {
            tags.insert("participant_id".to_string(), participant.to_string());
        }
        if let Some(room_id) = &room.room {
            tags.insert("room".to_string(), room_id.clone());
        }
        if let Some(display) = &room.display {
            tags.insert("display".to_string(), display.clone());
        }
        if let Some(plugin) = &room.plugin {
            tags.insert("plugin".to_string(), plugin.clone());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::create_metrics;
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;

    fn session(name: &str, sid: &str, ts: u64) -> Value {
        json!({ "type": 1, "session_id": sid, "timestamp": ts, "event": { "name": name } })
    }

    fn handle(name: &str, sid: &str, ts: u64) -> Value {
        json!({ "type": 2, "session_id": sid, "timestamp": ts, "event": { "name": name } })
    }

    fn room(sub_event: &str, sid: &str, participant: Option<&str>, ts: u64) -> Value {
        let mut data = json!({ "event": sub_event, "room": 1234, "display": "alice" });
        if let Some(p) = participant {
            data["id"] = json!(p);
        }
        json!({
            "type": 64,
            "session_id": sid,
            "timestamp": ts,
            "event": { "plugin": "janus.plugin.videoroom", "data": data }
        })
    }

    fn run(engine: &mut TraceEngine, raw: Value) -> Vec<Span> {
        engine.handle_value(&raw).unwrap()
    }

    #[test]
    fn test_session_lifecycle() {
        let mut engine = TraceEngine::default();
        assert!(run(&mut engine, session("created", "S1", 1000)).is_empty());
        let root = engine.directory().latest("S1").unwrap().root_span_id;

        let spans = run(&mut engine, session("destroyed", "S1", 5000));
        assert_eq!(spans.len(), 2);

        let completed = &spans[0];
        assert_eq!(completed.trace_id, "S1");
        assert_eq!(completed.span_id, root);
        assert_eq!(completed.parent_id, None);
        assert_eq!(completed.duration, 4000);
        assert_eq!(completed.timestamp, 1000);
        assert_eq!(completed.name, "Session S1");
        assert_eq!(completed.event, "created");

        let marker = &spans[1];
        assert_eq!(marker.name, "Destroyed S1");
        assert_eq!(marker.event, "destroyed");
        assert_eq!(marker.duration, MARKER_DURATION);
        assert_eq!(marker.timestamp, 5000);
        assert_eq!(marker.parent_id.as_deref(), Some(root.as_str()));
        assert_ne!(marker.span_id, completed.span_id);

        assert!(engine.directory().latest("S1").is_none());
        assert!(engine.pending().is_empty());
    }

    #[test]
    fn test_destroy_without_create_is_dropped() {
        let mut engine = TraceEngine::default();
        assert!(run(&mut engine, session("destroyed", "S9", 5000)).is_empty());
    }

    #[test]
    fn test_repeated_destroy_emits_once() {
        let mut engine = TraceEngine::default();
        run(&mut engine, session("created", "S1", 1000));
        assert_eq!(run(&mut engine, session("destroyed", "S1", 5000)).len(), 2);
        assert!(run(&mut engine, session("destroyed", "S1", 6000)).is_empty());
    }

    #[test]
    fn test_attachment_pairs_with_session_parent() {
        let mut engine = TraceEngine::default();
        run(&mut engine, session("created", "S1", 1000));
        let root = engine.directory().latest("S1").unwrap().parent_span_id;

        assert!(run(&mut engine, handle("attached", "S1", 2000)).is_empty());
        let spans = run(&mut engine, handle("detached", "S1", 3500));
        assert_eq!(spans.len(), 2);

        assert_eq!(spans[0].name, "Attached S1");
        assert_eq!(spans[0].duration, 1500);
        assert_eq!(spans[0].parent_id.as_deref(), Some(root.as_str()));

        assert_eq!(spans[1].name, "Detached S1");
        assert_eq!(spans[1].duration, MARKER_DURATION);
        assert_eq!(spans[1].parent_id.as_deref(), Some(spans[0].span_id.as_str()));
    }

    #[test]
    fn test_attachment_without_session_gets_fresh_parent() {
        let mut engine = TraceEngine::default();
        run(&mut engine, handle("attached", "S2", 10));
        let spans = run(&mut engine, handle("detached", "S2", 20));

        let parent = spans[0].parent_id.as_deref().unwrap();
        assert_eq!(parent.len(), 16);
        assert_eq!(spans[0].trace_id, "S2");
    }

    #[test]
    fn test_detach_without_attach_is_ignored() {
        let mut engine = TraceEngine::default();
        run(&mut engine, session("created", "S1", 1000));
        assert!(run(&mut engine, handle("detached", "S1", 2000)).is_empty());
        // session state is untouched
        assert!(engine.pending().contains("S1"));
        assert!(engine.directory().latest("S1").is_some());
    }

    #[test]
    fn test_join_leave() {
        let mut engine = TraceEngine::default();
        run(&mut engine, session("created", "S1", 50));
        let root = engine.directory().latest("S1").unwrap().parent_span_id;

        assert!(run(&mut engine, room("joined", "S1", Some("P1"), 100)).is_empty());
        let spans = run(&mut engine, room("leaving", "S1", Some("P1"), 900));
        assert_eq!(spans.len(), 2);

        assert_eq!(spans[0].duration, 800);
        assert_eq!(spans[0].timestamp, 100);
        assert_eq!(spans[0].event, "joined");
        assert_eq!(spans[0].name, "User P1 / Display Name: alice, Room 1234");
        assert_eq!(spans[0].parent_id.as_deref(), Some(root.as_str()));

        assert_eq!(spans[1].duration, MARKER_DURATION);
        assert_eq!(spans[1].name, "User P1 leaving / Display Name: alice, Room 1234");
        assert_eq!(spans[1].parent_id.as_deref(), Some(root.as_str()));
        assert_eq!(spans[1].trace_id, "S1");
        assert_eq!(spans[1].tags.get("participant_id").map(String::as_str), Some("P1"));

        assert!(!engine.pending().contains("join_P1"));
    }

    #[test]
    fn test_join_without_display_uses_placeholder() {
        let mut engine = TraceEngine::default();
        let joined = json!({
            "type": 64, "session_id": "S1", "timestamp": 1,
            "event": { "data": { "event": "joined", "id": 7, "room": "r" } }
        });
        run(&mut engine, joined);
        let spans = run(&mut engine, room("leaving", "S1", Some("7"), 2));
        assert_eq!(spans[0].name, "User 7 / Display Name: null, Room 1234");
    }

    #[test]
    fn test_configured_anchors_to_join_and_keeps_entry() {
        let mut engine = TraceEngine::default();
        run(&mut engine, room("joined", "S1", Some("P1"), 100));

        let first = run(&mut engine, room("configured", "S1", Some("P1"), 300));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].timestamp, 100);
        assert_eq!(first[0].duration, 200);
        assert_eq!(first[0].name, "Configured P1, Room 1234");

        // a second configure still anchors to the original join
        let second = run(&mut engine, room("configured", "S1", Some("P1"), 700));
        assert_eq!(second[0].timestamp, 100);
        assert_eq!(second[0].duration, 600);

        assert!(engine.pending().contains("join_P1"));
        assert_eq!(run(&mut engine, room("leaving", "S1", Some("P1"), 900))[0].duration, 800);
    }

    #[test]
    fn test_configured_without_join_is_dropped() {
        let mut engine = TraceEngine::default();
        assert!(run(&mut engine, room("configured", "S1", Some("P1"), 300)).is_empty());
    }

    #[test]
    fn test_publish_unpublish() {
        let mut engine = TraceEngine::default();
        run(&mut engine, session("created", "S1", 10));
        let root = engine.directory().latest("S1").unwrap().parent_span_id;

        assert!(run(&mut engine, room("published", "S1", Some("P1"), 100)).is_empty());
        let spans = run(&mut engine, room("unpublished", "S1", Some("P1"), 450));
        assert_eq!(spans.len(), 2);

        assert_eq!(spans[0].duration, 350);
        assert_eq!(
            spans[0].name,
            "Published P1 / Display Name: alice, Room 1234"
        );
        assert_eq!(spans[0].parent_id.as_deref(), Some(root.as_str()));
        assert_eq!(
            spans[1].name,
            "Unpublished P1 / Display Name: alice, Room 1234"
        );
        assert_eq!(spans[1].parent_id.as_deref(), Some(root.as_str()));
        assert_eq!(spans[1].trace_id, "S1");

        assert!(run(&mut engine, room("unpublished", "S1", Some("P1"), 500)).is_empty());
    }

    #[test]
    fn test_subscribing_subscribed_by_session() {
        let mut engine = TraceEngine::default();
        assert!(run(&mut engine, room("subscribing", "S1", None, 100)).is_empty());
        let spans = run(&mut engine, room("subscribed", "S1", None, 160));
        assert_eq!(spans.len(), 2);

        assert_eq!(spans[0].duration, 60);
        assert_eq!(spans[0].timestamp, 100);
        assert_eq!(spans[0].name, "Subscribed S1, Room 1234");
        assert_eq!(spans[1].duration, MARKER_DURATION);
        assert_eq!(spans[1].event, "subscribed");
        assert_eq!(spans[1].parent_id, spans[0].parent_id);

        // second confirmation has nothing to pair with
        assert!(run(&mut engine, room("subscribed", "S1", None, 200)).is_empty());
    }

    #[test]
    fn test_updated_emits_marker() {
        let mut engine = TraceEngine::default();
        run(&mut engine, session("created", "S1", 10));
        let root = engine.directory().latest("S1").unwrap().parent_span_id;

        let spans = run(&mut engine, room("updated", "S1", None, 20));
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "Updated S1, Room 1234");
        assert_eq!(spans[0].duration, MARKER_DURATION);
        assert_eq!(spans[0].parent_id.as_deref(), Some(root.as_str()));
        assert_eq!(engine.pending().len(), 1);
    }

    #[test]
    fn test_prefixes_keep_flows_apart() {
        let mut engine = TraceEngine::default();
        // participant id equal to the session id must not collide
        run(&mut engine, session("created", "S1", 0));
        run(&mut engine, handle("attached", "S1", 1));
        run(&mut engine, room("joined", "S1", Some("S1"), 2));
        run(&mut engine, room("published", "S1", Some("S1"), 3));
        run(&mut engine, room("subscribing", "S1", None, 4));
        assert_eq!(engine.pending().len(), 5);
    }

    #[test]
    fn test_evicted_start_is_missing_correlation() {
        let mut engine = TraceEngine::new(EngineConfig {
            pending_capacity: 2,
            ..Default::default()
        });
        run(&mut engine, room("joined", "S1", Some("P1"), 1));
        run(&mut engine, room("joined", "S1", Some("P2"), 2));
        run(&mut engine, room("joined", "S1", Some("P3"), 3));

        assert!(run(&mut engine, room("leaving", "S1", Some("P1"), 10)).is_empty());
        assert_eq!(run(&mut engine, room("leaving", "S1", Some("P3"), 10)).len(), 2);
    }

    #[test]
    fn test_ignored_and_other_events() {
        let mut engine = TraceEngine::default();
        let media = json!({ "type": 32, "session_id": 1, "event": { "media": "audio" } });
        assert!(run(&mut engine, media).is_empty());
        assert!(run(&mut engine, session("timeout", "S1", 1)).is_empty());
        assert!(run(&mut engine, room("talking", "S1", None, 1)).is_empty());
    }

    #[test]
    fn test_malformed_event_is_an_error() {
        let mut engine = TraceEngine::default();
        let raw = json!({ "type": 64, "session_id": "S1", "event": {} });
        assert!(engine.handle_value(&raw).is_err());
    }

    #[test]
    fn test_metrics_counters() {
        let metrics = create_metrics("test");
        let mut engine = TraceEngine::default().with_metrics(metrics.clone());

        run(&mut engine, session("created", "S1", 0));
        run(&mut engine, room("joined", "S1", Some("P1"), 1));
        run(&mut engine, room("joined", "S1", Some("P2"), 1));
        run(&mut engine, room("leaving", "S1", Some("P1"), 2));
        // untracked leave does not decrement
        run(&mut engine, room("leaving", "S1", Some("P9"), 2));

        assert_eq!(metrics.sessions.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.participants.load(Ordering::Relaxed), 1);

        run(&mut engine, session("destroyed", "S1", 3));
        assert_eq!(metrics.sessions.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.classified.read().get("joined"), Some(&2));
    }
}
