//! Time-bounded session directory

use lru::LruCache;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Records kept per key; older records are dropped first
const MAX_RECORDS_PER_KEY: usize = 16;

struct Record<V> {
    value: V,
    added_at: Instant,
}

/// Time-bounded multi-record store.
///
/// Every key holds a list of records, newest first. Records older than the
/// configured lifetime vanish on the next access. When more than `capacity`
/// keys are live, the least recently touched key is dropped.
pub struct SessionDirectory<V> {
    records: LruCache<String, VecDeque<Record<V>>>,
    max_age: Duration,
}

impl<V: Clone> SessionDirectory<V> {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            records: LruCache::new(capacity),
            max_age,
        }
    }

    /// Add a record for `key`
    pub fn add(&mut self, key: &str, value: V) {
        self.add_at(key, value, Instant::now());
    }

    /// Most recent `limit` values for `key`, newest first
    pub fn get(&mut self, key: &str, limit: usize) -> Vec<V> {
        self.get_at(key, limit, Instant::now())
    }

    /// Most recent value for `key`
    pub fn latest(&mut self, key: &str) -> Option<V> {
        self.get(key, 1).into_iter().next()
    }

    /// Remove every record for `key`
    pub fn remove(&mut self, key: &str) -> bool {
        self.records.pop(key).is_some()
    }

    /// Number of keys currently held (expired keys included until touched)
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn add_at(&mut self, key: &str, value: V, now: Instant) {
        self.evict_expired_tail(now);

        let record = Record {
            value,
            added_at: now,
        };
        if let Some(list) = self.records.get_mut(key) {
            list.push_front(record);
            list.truncate(MAX_RECORDS_PER_KEY);
        } else {
            self.records.put(key.to_string(), VecDeque::from([record]));
        }
    }

    fn get_at(&mut self, key: &str, limit: usize, now: Instant) -> Vec<V> {
        let max_age = self.max_age;
        let Some(list) = self.records.get_mut(key) else {
            return Vec::new();
        };

        list.retain(|r| now.saturating_duration_since(r.added_at) <= max_age);
        if list.is_empty() {
            self.records.pop(key);
            return Vec::new();
        }

        list.iter().take(limit).map(|r| r.value.clone()).collect()
    }

    /// Drop least recently used keys whose records have all expired
    fn evict_expired_tail(&mut self, now: Instant) {
        while let Some((_, list)) = self.records.peek_lru() {
            let expired = list
                .iter()
                .all(|r| now.saturating_duration_since(r.added_at) > self.max_age);
            if !expired {
                break;
            }
            self.records.pop_lru();
        }
    }
}
