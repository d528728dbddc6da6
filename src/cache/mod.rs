//! Multi-Tier Cache
//!
//! A logical key-value cache composed of up to three tiers behind one manager.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           Cache Manager                              │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  Volatile (in-process)  │  Durable (local)     │  Shared (remote)    │
//! │  ┌──────────────────┐   │  ┌────────────────┐  │  ┌───────────────┐  │
//! │  │ VolatileStore    │   │  │ AsyncStore     │  │  │ AsyncStore    │  │
//! │  │ (sync)           │   │  │ (async)        │  │  │ (async)       │  │
//! │  └──────────────────┘   │  └────────────────┘  │  └───────────────┘  │
//! │           ▲             │          ▲           │          │          │
//! │           └─────────────┴──────────┴───────────┴──────────┘          │
//! │                       promotion on read                              │
//! │                                                                      │
//! │  Write policy: write-through │ write-back (queue + timer) │ around   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads search volatile, then durable, then shared; a hit in a slower tier is
//! copied into the faster ones. The shared tier is written on every `set`
//! regardless of policy.

mod entry;
mod manager;
mod memory;
mod metrics;
mod policy;
mod tier;
mod write_back;

#[cfg(test)]
mod proptest;

pub use entry::{
    CacheEntry, CacheLookup, EntryMetadata, EntrySource, GetOptions, SetOptions, DEFAULT_PRIORITY,
};
pub use manager::{CacheManager, CacheTiers};
pub use memory::{MemoryStats, MemoryStore, MemoryTier};
pub use metrics::{CacheMetrics, CacheStats};
pub use policy::{ContextPolicy, ContextRules, WritePolicy};
pub use tier::{AsyncStore, TierKind, VolatileStore};
pub use write_back::{WriteBackEntry, WriteBackQueue};
