//! Cache Tier Contract
//!
//! Every backing store composing the logical cache implements one of two traits:
//! [`VolatileStore`] for the synchronous in-process tier, [`AsyncStore`] for the
//! durable and shared tiers whose operations may suspend.
//!
//! A tier never stores two live entries for the same key; `set` overwrites.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::entry::CacheEntry;
use crate::error::Result;

/// Cache tier, in lookup priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    /// Fast volatile storage (in-process)
    Volatile,
    /// Durable local storage
    Durable,
    /// Shared remote store
    Shared,
}

impl TierKind {
    /// All tiers, fastest first
    pub const ALL: [TierKind; 3] = [TierKind::Volatile, TierKind::Durable, TierKind::Shared];

    /// Lowercase label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Volatile => "volatile",
            TierKind::Durable => "durable",
            TierKind::Shared => "shared",
        }
    }
}

impl std::fmt::Display for TierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronous tier (volatile storage)
pub trait VolatileStore: Send + Sync {
    /// Get a live entry; expired entries read as absent
    fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Store an entry, replacing any previous entry for the key
    fn set(&self, entry: CacheEntry) -> bool;

    /// Check whether a live entry exists
    fn has(&self, key: &str) -> bool;

    /// Remove an entry, returning whether it was present
    fn delete(&self, key: &str) -> bool;

    /// Remove every entry
    fn clear(&self);

    /// Keys of live entries carrying `tag`
    fn find_by_tag(&self, tag: &str) -> Vec<String>;

    /// Number of stored entries
    fn len(&self) -> usize;

    /// Whether the tier holds no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Asynchronous tier (durable or shared storage)
#[async_trait]
pub trait AsyncStore: Send + Sync {
    /// Get a live entry; expired entries read as absent
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Store an entry, replacing any previous entry for the key
    async fn set(&self, entry: CacheEntry) -> Result<()>;

    /// Check whether a live entry exists
    async fn has(&self, key: &str) -> Result<bool>;

    /// Remove an entry, returning whether it was present
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every entry
    async fn clear(&self) -> Result<()>;

    /// Keys of live entries carrying `tag`
    async fn find_by_tag(&self, tag: &str) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_display() {
        assert_eq!(TierKind::Volatile.to_string(), "volatile");
        assert_eq!(TierKind::Durable.to_string(), "durable");
        assert_eq!(TierKind::Shared.to_string(), "shared");
    }

    #[test]
    fn test_tier_priority_order() {
        assert!(TierKind::Volatile < TierKind::Durable);
        assert!(TierKind::Durable < TierKind::Shared);
        assert_eq!(TierKind::ALL[0], TierKind::Volatile);
    }

    #[test]
    fn test_tier_serde_name() {
        let json = serde_json::to_string(&TierKind::Shared).unwrap();
        assert_eq!(json, "\"shared\"");
    }
}
