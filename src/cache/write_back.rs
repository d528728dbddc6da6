//! Write-Back Queue
//!
//! Pending durable-tier writes under the write-back policy, keyed by cache key
//! so a newer `set` replaces the queued one. Shared between foreground calls
//! and the background flush timer.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::entry::{CacheEntry, SetOptions};

/// A queued durable write
#[derive(Debug, Clone)]
pub struct WriteBackEntry {
    /// Cache key
    pub key: String,
    /// Value at the time of `set`
    pub value: Bytes,
    /// Options at the time of `set`
    pub options: SetOptions,
    /// Enqueue time
    pub timestamp: DateTime<Utc>,
}

impl WriteBackEntry {
    /// Create a queued write
    pub fn new(key: impl Into<String>, value: Bytes, options: SetOptions) -> Self {
        Self {
            key: key.into(),
            value,
            options,
            timestamp: Utc::now(),
        }
    }

    /// Build the entry to write to the durable tier, expiring relative to enqueue time
    pub fn to_entry(&self) -> CacheEntry {
        CacheEntry::new_at(
            self.key.clone(),
            self.value.clone(),
            &self.options,
            self.timestamp,
        )
    }
}

/// Ordered write-back queue
#[derive(Debug, Default)]
pub struct WriteBackQueue {
    pending: Mutex<BTreeMap<String, WriteBackEntry>>,
}

impl WriteBackQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a write, replacing any pending write for the same key
    pub fn enqueue(&self, entry: WriteBackEntry) {
        self.pending.lock().insert(entry.key.clone(), entry);
    }

    /// Drop the pending write for `key`
    pub fn remove(&self, key: &str) -> Option<WriteBackEntry> {
        self.pending.lock().remove(key)
    }

    /// Take every pending write, leaving the queue empty
    pub fn drain(&self) -> Vec<WriteBackEntry> {
        std::mem::take(&mut *self.pending.lock())
            .into_values()
            .collect()
    }

    /// Keys of pending writes carrying `tag`
    pub fn keys_with_tag(&self, tag: &str) -> Vec<String> {
        self.pending
            .lock()
            .values()
            .filter(|e| e.options.tags.iter().any(|t| t == tag))
            .map(|e| e.key.clone())
            .collect()
    }

    /// Discard every pending write
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    /// Number of pending writes
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(key: &str, data: &'static [u8]) -> WriteBackEntry {
        WriteBackEntry::new(key, Bytes::from_static(data), SetOptions::default())
    }

    #[test]
    fn test_enqueue_overwrites_same_key() {
        let queue = WriteBackQueue::new();
        queue.enqueue(make("a", b"1"));
        queue.enqueue(make("a", b"2"));

        let drained = queue.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].value.as_ref(), b"2");
    }

    #[test]
    fn test_remove() {
        let queue = WriteBackQueue::new();
        queue.enqueue(make("a", b"1"));

        assert!(queue.remove("a").is_some());
        assert!(queue.remove("a").is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_is_ordered_and_empties() {
        let queue = WriteBackQueue::new();
        queue.enqueue(make("c", b"3"));
        queue.enqueue(make("a", b"1"));
        queue.enqueue(make("b", b"2"));

        let drained: Vec<String> = queue.drain().into_iter().map(|e| e.key).collect();
        assert_eq!(drained, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_keys_with_tag() {
        let queue = WriteBackQueue::new();
        queue.enqueue(WriteBackEntry::new(
            "a",
            Bytes::new(),
            SetOptions::new().tags(["T"]),
        ));
        queue.enqueue(make("b", b"2"));

        assert_eq!(queue.keys_with_tag("T"), vec!["a".to_string()]);
    }

    #[test]
    fn test_to_entry_carries_options() {
        let entry = WriteBackEntry::new("a", Bytes::from_static(b"v"), SetOptions::new().priority(7))
            .to_entry();
        assert_eq!(entry.key(), "a");
        assert_eq!(entry.metadata.priority, 7);
    }
}
