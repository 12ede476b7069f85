//! Size-bounded pending-pair cache

use super::PendingSpan;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::trace;

struct Entry {
    span: PendingSpan,
    stored_at: Instant,
}

/// LRU cache of start events awaiting their end event.
///
/// Over capacity the least recently used entry is dropped silently; entries
/// older than `max_age` are dropped when next accessed.
pub struct PendingCache {
    entries: LruCache<String, Entry>,
    max_age: Duration,
    evictions: u64,
}

impl PendingCache {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            max_age,
            evictions: 0,
        }
    }

    /// Store `span` under `key`, replacing any previous entry
    pub fn set(&mut self, key: &str, span: PendingSpan) {
        self.set_at(key, span, Instant::now());
    }

    /// Look up `key`, refreshing its recency
    pub fn get(&mut self, key: &str) -> Option<&PendingSpan> {
        self.get_at(key, Instant::now())
    }

    /// Remove and return the entry for `key`
    pub fn take(&mut self, key: &str) -> Option<PendingSpan> {
        self.take_at(key, Instant::now())
    }

    /// Delete the entry for `key`
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.pop(key).is_some()
    }

    /// Whether a live entry exists for `key`, without touching recency
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .peek(key)
            .is_some_and(|e| e.stored_at.elapsed() <= self.max_age)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped for capacity since creation
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    fn set_at(&mut self, key: &str, span: PendingSpan, now: Instant) {
        let entry = Entry {
            span,
            stored_at: now,
        };
        if let Some((evicted_key, _)) = self.entries.push(key.to_string(), entry) {
            if evicted_key != key {
                self.evictions += 1;
                trace!("Pending entry evicted: {}", evicted_key);
            }
        }
    }

    fn get_at(&mut self, key: &str, now: Instant) -> Option<&PendingSpan> {
        if self.is_expired(key, now) {
            self.entries.pop(key);
            return None;
        }
        self.entries.get(key).map(|e| &e.span)
    }

    fn take_at(&mut self, key: &str, now: Instant) -> Option<PendingSpan> {
        let entry = self.entries.pop(key)?;
        if now.saturating_duration_since(entry.stored_at) > self.max_age {
            return None;
        }
        Some(entry.span)
    }

    fn is_expired(&self, key: &str, now: Instant) -> bool {
        self.entries
            .peek(key)
            .is_some_and(|e| now.saturating_duration_since(e.stored_at) > self.max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(key: &str, timestamp: u64) -> PendingSpan {
        PendingSpan {
            key: key.to_string(),
            name: format!("span {}", key),
            event: "joined".into(),
            span_id: "00000000000000ab".into(),
            trace_id: "S1".into(),
            parent_id: None,
            timestamp,
            session_id: "S1".into(),
            display: None,
            room: None,
            tags: Default::default(),
        }
    }

    #[test]
    fn test_set_get_take() {
        let mut cache = PendingCache::new(10, Duration::from_secs(60));
        cache.set("join_1", pending("join_1", 100));

        assert_eq!(cache.get("join_1").map(|p| p.timestamp), Some(100));
        // get does not consume
        assert!(cache.contains("join_1"));

        let taken = cache.take("join_1").unwrap();
        assert_eq!(taken.key, "join_1");
        assert!(cache.take("join_1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_delete() {
        let mut cache = PendingCache::new(10, Duration::from_secs(60));
        cache.set("pub_1", pending("pub_1", 1));
        assert!(cache.delete("pub_1"));
        assert!(!cache.delete("pub_1"));
    }

    #[test]
    fn test_set_replaces_without_counting_eviction() {
        let mut cache = PendingCache::new(1, Duration::from_secs(60));
        cache.set("k", pending("k", 1));
        cache.set("k", pending("k", 2));
        assert_eq!(cache.get("k").map(|p| p.timestamp), Some(2));
        assert_eq!(cache.evictions(), 0);
    }

    #[test]
    fn test_lru_eviction_over_capacity() {
        let mut cache = PendingCache::new(2, Duration::from_secs(60));
        cache.set("a", pending("a", 1));
        cache.set("b", pending("b", 2));
        // refresh a, leaving b least recently used
        assert!(cache.get("a").is_some());
        cache.set("c", pending("c", 3));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.evictions(), 1);
        assert!(cache.take("b").is_none());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let mut cache = PendingCache::new(10, Duration::from_millis(100));
        let start = Instant::now();
        cache.set_at("a", pending("a", 1), start);
        cache.set_at("b", pending("b", 2), start);

        let later = start + Duration::from_millis(200);
        assert!(cache.get_at("a", later).is_none());
        assert!(cache.take_at("b", later).is_none());
        assert!(cache.is_empty());
    }
}
