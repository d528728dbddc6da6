//! In-Memory Tiers
//!
//! Reference tier implementations backed by DashMap for lock-free concurrent
//! access. [`MemoryTier`] is the synchronous volatile tier; [`MemoryStore`]
//! implements the asynchronous contract and stands in for durable or shared
//! storage in tests and the demo binary.
//!
//! # Design
//!
//! - Expired entries read as absent and are dropped lazily on access
//! - Optional entry bound; eviction removes expired entries first, then the
//!   lowest priority, oldest entry

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::entry::CacheEntry;
use super::tier::{AsyncStore, VolatileStore};
use crate::error::Result;

/// In-memory tier statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Stored entries (including not yet reaped expired ones)
    pub entries: u64,
    /// Read operations
    pub reads: u64,
    /// Write operations
    pub writes: u64,
    /// Delete operations
    pub deletes: u64,
    /// Entries evicted to respect the bound
    pub evictions: u64,
}

/// Shared storage core for both in-memory tiers
#[derive(Debug, Default)]
struct EntryMap {
    entries: DashMap<String, CacheEntry>,
    max_entries: Option<usize>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
}

impl EntryMap {
    fn new(max_entries: Option<usize>) -> Self {
        Self {
            max_entries,
            ..Default::default()
        }
    }

    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        // Clone out before any removal; holding a ref while removing deadlocks the shard
        let entry = self.entries.get(key).map(|e| e.value().clone())?;
        if entry.is_expired() {
            self.entries.remove_if(key, |_, e| e.is_expired());
            return None;
        }
        Some(entry)
    }

    fn set(&self, entry: CacheEntry) {
        self.writes.fetch_add(1, Ordering::Relaxed);

        if let Some(max) = self.max_entries {
            if !self.entries.contains_key(entry.key()) {
                while self.entries.len() >= max.max(1) {
                    if !self.evict_one() {
                        break;
                    }
                }
            }
        }

        self.entries.insert(entry.key().to_string(), entry);
    }

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn delete(&self, key: &str) -> bool {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        match self.entries.remove(key) {
            Some((_, entry)) => !entry.is_expired(),
            None => false,
        }
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn find_by_tag(&self, tag: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.metadata.has_tag(tag) && !e.is_expired())
            .map(|e| e.key().clone())
            .collect()
    }

    /// Evict a single entry: expired first, then lowest priority, then oldest
    fn evict_one(&self) -> bool {
        let victim = self
            .entries
            .iter()
            .min_by(|a, b| {
                let a_rank = (!a.is_expired(), a.metadata.priority, a.metadata.created_at);
                let b_rank = (!b.is_expired(), b.metadata.priority, b.metadata.created_at);
                a_rank.cmp(&b_rank)
            })
            .map(|e| e.key().clone());

        match victim {
            Some(key) => {
                if self.entries.remove(&key).is_some() {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                true
            }
            None => false,
        }
    }

    fn stats(&self) -> MemoryStats {
        MemoryStats {
            entries: self.entries.len() as u64,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Volatile in-process tier
#[derive(Debug, Default)]
pub struct MemoryTier {
    map: EntryMap,
}

impl MemoryTier {
    /// Create an unbounded tier
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tier holding at most `max_entries` entries
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            map: EntryMap::new(Some(max_entries)),
        }
    }

    /// Get tier statistics
    pub fn stats(&self) -> MemoryStats {
        self.map.stats()
    }
}

impl VolatileStore for MemoryTier {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.map.get(key)
    }

    fn set(&self, entry: CacheEntry) -> bool {
        self.map.set(entry);
        true
    }

    fn has(&self, key: &str) -> bool {
        self.map.has(key)
    }

    fn delete(&self, key: &str) -> bool {
        self.map.delete(key)
    }

    fn clear(&self) {
        self.map.clear();
    }

    fn find_by_tag(&self, tag: &str) -> Vec<String> {
        self.map.find_by_tag(tag)
    }

    fn len(&self) -> usize {
        self.map.entries.len()
    }
}

/// Asynchronous in-memory store (durable/shared stand-in)
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: EntryMap,
}

impl MemoryStore {
    /// Create an unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding at most `max_entries` entries
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            map: EntryMap::new(Some(max_entries)),
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.map.entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.map.entries.is_empty()
    }

    /// Get store statistics
    pub fn stats(&self) -> MemoryStats {
        self.map.stats()
    }
}

#[async_trait]
impl AsyncStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.map.get(key))
    }

    async fn set(&self, entry: CacheEntry) -> Result<()> {
        self.map.set(entry);
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.map.has(key))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.map.delete(key))
    }

    async fn clear(&self) -> Result<()> {
        self.map.clear();
        Ok(())
    }

    async fn find_by_tag(&self, tag: &str) -> Result<Vec<String>> {
        Ok(self.map.find_by_tag(tag))
    }
}

// =============================================================================
// Tests
// =============================================================================
