//! Tiercache - Tiered Cache with Predictive Pre-Caching
//!
//! Composes a volatile, a durable and a shared store into one logical cache
//! with a single write policy, tag-based invalidation and unified
//! read/promote semantics. A predictive engine watches the reads, learns
//! recurring key sequences and warms the cache ahead of demand.
//!
//! # Architecture
//!
//! ```text
//! caller ──▶ CacheManager ──▶ volatile → durable → shared
//!                 │
//!                 └── get events ──▶ PredictiveCache ──▶ set(preCache)
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Tier contract, cache manager, write policies and stats
//! - [`config`] - YAML configuration with documented defaults
//! - [`error`] - Error types
//! - [`events`] - Notification channel
//! - [`predictive`] - Pattern learning and pre-caching
//!
//! # Example
//!
//! ```ignore
//! let manager = CacheManager::in_memory(CacheConfig::default())?;
//! let engine = PredictiveCache::new(manager.clone(), PredictiveConfig::default())?;
//!
//! manager.set("user:1", Bytes::from("alice"), SetOptions::new().tags(["users"])).await;
//! let hit = manager.get("user:1", &GetOptions::new()).await;
//! engine.trigger_pre_cache().await;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod predictive;

// Re-export commonly used types
pub use cache::{
    AsyncStore, CacheEntry, CacheLookup, CacheManager, CacheStats, CacheTiers, ContextPolicy,
    ContextRules, EntrySource, GetOptions, MemoryStore, MemoryTier, SetOptions, TierKind,
    VolatileStore, WritePolicy,
};
pub use config::{CacheConfig, PredictiveConfig, TierConfig};
pub use error::{Error, Result};
pub use events::{CacheEvent, EventBus, EventCollector, SubscriptionId};
pub use predictive::{source_fn, PredictiveCache, PredictiveEvent, Prediction, PrefetchSource};
