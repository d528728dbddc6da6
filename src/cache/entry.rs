//! Cache Entry Types
//!
//! Entries are owned by the tiers. The manager builds them from [`SetOptions`]
//! and moves clones between tiers on promotion, so expiry, tags, priority and
//! provenance travel with the value.

use std::collections::BTreeSet;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::tier::TierKind;

/// Default entry priority
pub const DEFAULT_PRIORITY: i32 = 1;

/// Provenance of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntrySource {
    /// Written directly by a caller
    #[default]
    Api,
    /// Produced by a caller fetch function after a miss
    Fetch,
    /// Populated speculatively by the predictive engine
    PredictivePreCache,
}

impl std::fmt::Display for EntrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntrySource::Api => write!(f, "api"),
            EntrySource::Fetch => write!(f, "fetch"),
            EntrySource::PredictivePreCache => write!(f, "predictivePreCache"),
        }
    }
}

/// Metadata stored alongside every value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    /// Absolute expiry time (None = never expires)
    pub expires: Option<DateTime<Utc>>,
    /// Tags for bulk invalidation
    pub tags: BTreeSet<String>,
    /// Eviction tie-break hint, interpreted by the tier
    pub priority: i32,
    /// Provenance label
    pub source: EntrySource,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Free-form attributes (e.g. prediction confidence for pre-cached entries)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl EntryMetadata {
    /// Check if the entry has expired at `now`
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires, Some(expires) if now >= expires)
    }

    /// Check if the entry carries `tag`
    #[inline]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// A cached value with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    key: String,
    value: Bytes,
    /// Entry metadata
    pub metadata: EntryMetadata,
}

impl CacheEntry {
    /// Build an entry from write options
    pub fn new(key: impl Into<String>, value: Bytes, options: &SetOptions) -> Self {
        Self::new_at(key, value, options, Utc::now())
    }

    /// Build an entry as if it had been written at `now`
    pub fn new_at(
        key: impl Into<String>,
        value: Bytes,
        options: &SetOptions,
        now: DateTime<Utc>,
    ) -> Self {
        let expires = options.ttl.and_then(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| now.checked_add_signed(ttl))
        });

        Self {
            key: key.into(),
            value,
            metadata: EntryMetadata {
                expires,
                tags: options.tags.iter().cloned().collect(),
                priority: options.priority,
                source: options.source,
                created_at: now,
                attributes: options.attributes.clone(),
            },
        }
    }

    /// Cache key
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Cached value (zero-copy)
    #[inline]
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Check if expired now
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.metadata.is_expired_at(Utc::now())
    }
}

/// Options for `set`
#[derive(Debug, Clone, PartialEq)]
pub struct SetOptions {
    /// Time to live (None = no expiry)
    pub ttl: Option<Duration>,
    /// Tags for bulk invalidation
    pub tags: Vec<String>,
    /// Eviction priority hint
    pub priority: i32,
    /// Provenance label
    pub source: EntrySource,
    /// Extra metadata recorded on the entry
    pub attributes: Map<String, Value>,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            tags: Vec::new(),
            priority: DEFAULT_PRIORITY,
            source: EntrySource::Api,
            attributes: Map::new(),
        }
    }
}

impl SetOptions {
    /// Default options (priority 1, source "api", no TTL, no tags)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time to live
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the tags
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the priority
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the provenance label
    pub fn source(mut self, source: EntrySource) -> Self {
        self.source = source;
        self
    }

    /// Record an extra metadata attribute
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Options for `get` / `get_or_fetch`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetOptions {
    /// Return entry metadata with the value
    pub include_metadata: bool,
    /// TTL for a value produced by the fetch function
    pub ttl: Option<Duration>,
    /// Tags for a value produced by the fetch function
    pub tags: Vec<String>,
}

impl GetOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Request metadata with the value
    pub fn with_metadata(mut self) -> Self {
        self.include_metadata = true;
        self
    }

    /// TTL applied when the fetch function fills a miss
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Tags applied when the fetch function fills a miss
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    /// The cached value
    pub value: Bytes,
    /// Tier that served the value (None when the fetch function produced it)
    pub tier: Option<TierKind>,
    /// Entry metadata, present when requested
    pub metadata: Option<EntryMetadata>,
}

// =============================================================================
// Tests
// =============================================================================
