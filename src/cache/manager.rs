//! Cache Manager - Unified Three-Tier Cache
//!
//! Orchestrates the volatile, durable and shared tiers under a single write
//! policy. Reads walk the tiers fastest-first and promote hits upward; writes
//! follow the configured [`WritePolicy`] for the durable tier and always go
//! through to the shared tier.
//!
//! # Consistency
//!
//! There is no per-key locking across tier calls. A `get` and a concurrent
//! `set` of the same key may interleave, and the last write to land in a tier
//! wins. Likewise a `delete` racing a write-back flush may see the flushed value
//! reappear in the durable tier. Freshness is best-effort, not linearizable.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::entry::{CacheEntry, CacheLookup, EntrySource, GetOptions, SetOptions};
use super::memory::{MemoryStore, MemoryTier};
use super::metrics::{CacheMetrics, CacheStats};
use super::policy::{ContextPolicy, WritePolicy};
use super::tier::{AsyncStore, TierKind, VolatileStore};
use super::write_back::{WriteBackEntry, WriteBackQueue};
use crate::config::{CacheConfig, TierConfig};
use crate::error::{Error, Result};
use crate::events::{CacheEvent, EventBus};

/// The set of tiers a manager composes
#[derive(Clone, Default)]
pub struct CacheTiers {
    /// Fast in-process tier
    pub volatile: Option<Arc<dyn VolatileStore>>,
    /// Durable local tier
    pub durable: Option<Arc<dyn AsyncStore>>,
    /// Shared remote tier
    pub shared: Option<Arc<dyn AsyncStore>>,
}

impl CacheTiers {
    /// No tiers
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the volatile tier
    pub fn with_volatile(mut self, tier: Arc<dyn VolatileStore>) -> Self {
        self.volatile = Some(tier);
        self
    }

    /// Set the durable tier
    pub fn with_durable(mut self, tier: Arc<dyn AsyncStore>) -> Self {
        self.durable = Some(tier);
        self
    }

    /// Set the shared tier
    pub fn with_shared(mut self, tier: Arc<dyn AsyncStore>) -> Self {
        self.shared = Some(tier);
        self
    }

    /// In-memory tiers for every tier enabled in `config`
    pub fn in_memory(config: &CacheConfig) -> Self {
        fn store(tier: &TierConfig) -> Option<Arc<dyn AsyncStore>> {
            tier.enabled.then(|| -> Arc<dyn AsyncStore> {
                match tier.max_entries {
                    Some(max) => Arc::new(MemoryStore::with_capacity(max)),
                    None => Arc::new(MemoryStore::new()),
                }
            })
        }

        let volatile = config.volatile.enabled.then(|| -> Arc<dyn VolatileStore> {
            match config.volatile.max_entries {
                Some(max) => Arc::new(MemoryTier::with_capacity(max)),
                None => Arc::new(MemoryTier::new()),
            }
        });

        Self {
            volatile,
            durable: store(&config.durable),
            shared: store(&config.shared),
        }
    }

    /// Configured tiers, fastest first
    pub fn kinds(&self) -> Vec<TierKind> {
        let mut kinds = Vec::with_capacity(3);
        if self.volatile.is_some() {
            kinds.push(TierKind::Volatile);
        }
        if self.durable.is_some() {
            kinds.push(TierKind::Durable);
        }
        if self.shared.is_some() {
            kinds.push(TierKind::Shared);
        }
        kinds
    }
}

/// Unified cache manager
pub struct CacheManager {
    /// Configuration
    config: CacheConfig,
    /// Backing tiers
    tiers: CacheTiers,
    /// Tiers present, fastest first
    configured: Vec<TierKind>,
    /// Optional context hook
    context: Option<Arc<dyn ContextPolicy>>,
    /// Pending durable writes (write-back only)
    write_back: WriteBackQueue,
    /// Metrics collector
    metrics: CacheMetrics,
    /// Notification channel
    events: EventBus<CacheEvent>,
    /// Stops the background write-back timer
    shutdown: CancellationToken,
}

impl CacheManager {
    /// Create a manager over caller-supplied tiers.
    ///
    /// The context policy comes from `config.context` when set. Under the
    /// write-back policy this spawns the flush timer on the current Tokio
    /// runtime. Fails if `config` does not validate.
    pub fn new(config: CacheConfig, tiers: CacheTiers) -> Result<Arc<Self>> {
        let context = config
            .context
            .clone()
            .map(|rules| Arc::new(rules) as Arc<dyn ContextPolicy>);
        Self::build(config, tiers, context)
    }

    /// Create a manager with an explicit context policy hook
    pub fn with_context_policy(
        config: CacheConfig,
        tiers: CacheTiers,
        policy: Arc<dyn ContextPolicy>,
    ) -> Result<Arc<Self>> {
        Self::build(config, tiers, Some(policy))
    }

    /// Create a manager with in-memory tiers for every enabled tier
    pub fn in_memory(config: CacheConfig) -> Result<Arc<Self>> {
        let tiers = CacheTiers::in_memory(&config);
        Self::new(config, tiers)
    }

    fn build(
        config: CacheConfig,
        tiers: CacheTiers,
        context: Option<Arc<dyn ContextPolicy>>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let manager = Arc::new(Self {
            configured: tiers.kinds(),
            config,
            tiers,
            context,
            write_back: WriteBackQueue::new(),
            metrics: CacheMetrics::new(),
            events: EventBus::new(),
            shutdown: CancellationToken::new(),
        });

        if manager.config.write_policy.defers_durable() {
            manager.spawn_write_back_timer();
        }

        Ok(manager)
    }

    /// Spawn the periodic flush task.
    ///
    /// The task holds only a weak reference, so it never keeps the manager
    /// alive, and it exits on `shutdown()` or when the manager is dropped.
    fn spawn_write_back_timer(self: &Arc<Self>) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No Tokio runtime; write-back queue flushes only on explicit flush()");
                return;
            }
        };

        let manager: Weak<Self> = Arc::downgrade(self);
        let token = self.shutdown.clone();
        let delay = self.config.write_back_delay;

        handle.spawn(async move {
            info!(delay_ms = delay.as_millis() as u64, "Starting write-back timer");

            let mut tick = interval_at(Instant::now() + delay, delay);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        if !manager.write_back.is_empty() {
                            manager.flush().await;
                        }
                    }
                }
            }

            info!("Write-back timer stopped");
        });
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value, searching the tiers fastest-first.
    ///
    /// Every attempt, hit or miss, is announced on the notification channel.
    #[instrument(skip(self, options))]
    pub async fn get(&self, key: &str, options: &GetOptions) -> Option<CacheLookup> {
        self.metrics.record_get();

        // Cacheability only gates promotion, never the read itself
        let cacheable = self.should_cache(key);

        match self.lookup(key, cacheable).await {
            Some((tier, entry)) => {
                self.emit_get(key, Some(tier));
                Some(CacheLookup {
                    value: entry.value().clone(),
                    tier: Some(tier),
                    metadata: options.include_metadata.then(|| entry.metadata.clone()),
                })
            }
            None => {
                self.metrics.record_miss(&self.configured);
                self.emit_get(key, None);
                None
            }
        }
    }

    /// Get a value, filling a miss from `fetch`.
    ///
    /// The fetched value is cached through `set` (TTL rescaled by the context
    /// policy, source "fetch"). A failing fetch is reported on the notification
    /// channel and yields `None`.
    #[instrument(skip(self, options, fetch))]
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        options: &GetOptions,
        fetch: F,
    ) -> Option<CacheLookup>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        if let Some(hit) = self.get(key, options).await {
            return Some(hit);
        }

        match fetch().await {
            Ok(value) => {
                let set_options = SetOptions {
                    ttl: options.ttl,
                    tags: options.tags.clone(),
                    source: EntrySource::Fetch,
                    ..Default::default()
                };
                let metadata = options.include_metadata.then(|| {
                    let mut stored = set_options.clone();
                    stored.ttl = self.adjust_ttl(stored.ttl, key);
                    CacheEntry::new(key, value.clone(), &stored).metadata
                });

                self.set(key, value.clone(), set_options).await;

                Some(CacheLookup {
                    value,
                    tier: None,
                    metadata,
                })
            }
            Err(e) => {
                self.report_error(
                    Error::Fetch {
                        key: key.to_string(),
                        reason: e.to_string(),
                    },
                    "fetch",
                    Some(key),
                );
                None
            }
        }
    }

    /// Walk the tiers; record the hit and promote it
    async fn lookup(&self, key: &str, cacheable: bool) -> Option<(TierKind, CacheEntry)> {
        if let Some(volatile) = &self.tiers.volatile {
            if let Some(entry) = volatile.get(key) {
                self.metrics.record_hit(TierKind::Volatile);
                return Some((TierKind::Volatile, entry));
            }
        }

        if let Some(durable) = &self.tiers.durable {
            match durable.get(key).await {
                Ok(Some(entry)) => {
                    self.metrics.record_hit(TierKind::Durable);
                    if cacheable {
                        self.promote_to_volatile(&entry);
                    }
                    return Some((TierKind::Durable, entry));
                }
                Ok(None) => {}
                Err(e) => self.report_error(e, "get", Some(key)),
            }
        }

        if let Some(shared) = &self.tiers.shared {
            match shared.get(key).await {
                Ok(Some(entry)) => {
                    self.metrics.record_hit(TierKind::Shared);
                    if cacheable {
                        self.promote_to_volatile(&entry);
                        if self.config.write_policy.promotes_to_durable() {
                            self.promote_to_durable(&entry).await;
                        }
                    }
                    return Some((TierKind::Shared, entry));
                }
                Ok(None) => {}
                Err(e) => self.report_error(e, "get", Some(key)),
            }
        }

        None
    }

    fn promote_to_volatile(&self, entry: &CacheEntry) {
        if let Some(volatile) = &self.tiers.volatile {
            if volatile.set(entry.clone()) {
                self.metrics.record_promotion();
                debug!(key = entry.key(), "Promoted into volatile tier");
            }
        }
    }

    async fn promote_to_durable(&self, entry: &CacheEntry) {
        if let Some(durable) = &self.tiers.durable {
            match durable.set(entry.clone()).await {
                Ok(()) => {
                    self.metrics.record_promotion();
                    debug!(key = entry.key(), "Promoted into durable tier");
                }
                Err(e) => self.report_error(e, "promote", Some(entry.key())),
            }
        }
    }

    /// Check whether any tier holds a live entry for `key`
    pub async fn has(&self, key: &str) -> bool {
        if let Some(volatile) = &self.tiers.volatile {
            if volatile.has(key) {
                return true;
            }
        }

        for (tier, store) in self.async_tiers() {
            match store.has(key).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    debug!(%tier, "has() failed, treating as absent");
                    self.report_error(e, "has", Some(key));
                }
            }
        }

        false
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store a value.
    ///
    /// Returns false when the context policy vetoes caching (no tier is
    /// touched) or when a tier write fails. Tier failures are reported on the
    /// notification channel; the remaining tiers are still written.
    #[instrument(skip(self, value, options))]
    pub async fn set(&self, key: &str, value: Bytes, mut options: SetOptions) -> bool {
        if !self.should_cache(key) {
            debug!("Context policy vetoed caching");
            return false;
        }
        options.ttl = self.adjust_ttl(options.ttl, key);

        let entry = CacheEntry::new(key, value.clone(), &options);
        let mut ok = true;

        if let Some(volatile) = &self.tiers.volatile {
            if !volatile.set(entry.clone()) {
                ok = false;
            }
        }

        if let Some(durable) = &self.tiers.durable {
            let policy = self.config.write_policy;
            if policy.writes_durable_now() {
                if let Err(e) = durable.set(entry.clone()).await {
                    self.report_error(e, "set", Some(key));
                    ok = false;
                }
            } else if policy.defers_durable() {
                self.write_back.enqueue(WriteBackEntry {
                    key: key.to_string(),
                    value: value.clone(),
                    options: options.clone(),
                    timestamp: entry.metadata.created_at,
                });
            }
        }

        // Shared tier is written on every policy, write-around included
        if let Some(shared) = &self.tiers.shared {
            if let Err(e) = shared.set(entry).await {
                self.report_error(e, "set", Some(key));
                ok = false;
            }
        }

        if ok {
            self.metrics.record_set();
            self.events.emit(&CacheEvent::Set {
                key: key.to_string(),
                value,
                tags: options.tags,
                source: options.source,
                timestamp: Utc::now(),
            });
        }

        ok
    }

    /// Delete a key from every tier and from the write-back queue.
    ///
    /// Returns true if any tier held the key.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> bool {
        self.metrics.record_delete();
        self.write_back.remove(key);

        let mut existed = false;

        if let Some(volatile) = &self.tiers.volatile {
            existed |= volatile.delete(key);
        }

        for (_, store) in self.async_tiers() {
            match store.delete(key).await {
                Ok(deleted) => existed |= deleted,
                Err(e) => self.report_error(e, "delete", Some(key)),
            }
        }

        self.events.emit(&CacheEvent::Delete {
            key: key.to_string(),
            existed,
            timestamp: Utc::now(),
        });

        existed
    }

    /// Delete several keys, returning how many existed
    pub async fn delete_many<I, S>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut count = 0;
        for key in keys {
            if self.delete(key.as_ref()).await {
                count += 1;
            }
        }
        count
    }

    /// Delete every key carrying `tag` in any tier, returning how many existed
    #[instrument(skip(self))]
    pub async fn delete_by_tag(&self, tag: &str) -> usize {
        let mut keys: BTreeSet<String> = BTreeSet::new();

        if let Some(volatile) = &self.tiers.volatile {
            keys.extend(volatile.find_by_tag(tag));
        }

        for (_, store) in self.async_tiers() {
            match store.find_by_tag(tag).await {
                Ok(found) => keys.extend(found),
                Err(e) => self.report_error(e, "find_by_tag", None),
            }
        }

        keys.extend(self.write_back.keys_with_tag(tag));

        debug!(tag, matched = keys.len(), "Deleting by tag");
        self.delete_many(keys).await
    }

    /// Empty every tier and the write-back queue
    #[instrument(skip(self))]
    pub async fn clear(&self) {
        self.write_back.clear();

        if let Some(volatile) = &self.tiers.volatile {
            volatile.clear();
        }

        for (_, store) in self.async_tiers() {
            if let Err(e) = store.clear().await {
                self.report_error(e, "clear", None);
            }
        }

        self.events.emit(&CacheEvent::Clear {
            timestamp: Utc::now(),
        });
    }

    /// Drain the write-back queue into the durable tier.
    ///
    /// Each queued write is attempted once; failures are reported and the
    /// remaining entries are still written. Returns the number written.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> usize {
        let pending = self.write_back.drain();
        let mut flushed = 0;

        match &self.tiers.durable {
            Some(durable) => {
                for queued in pending {
                    match durable.set(queued.to_entry()).await {
                        Ok(()) => flushed += 1,
                        Err(e) => self.report_error(e, "flush", Some(&queued.key)),
                    }
                }
            }
            None if !pending.is_empty() => {
                warn!(dropped = pending.len(), "No durable tier; discarding queued writes");
            }
            None => {}
        }

        self.metrics.record_flush();
        debug!(flushed, "Write-back flush complete");
        self.events.emit(&CacheEvent::Flush {
            count: flushed,
            timestamp: Utc::now(),
        });

        flushed
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Get a statistics snapshot
    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot(self.write_back.len())
    }

    /// Notification channel
    pub fn events(&self) -> &EventBus<CacheEvent> {
        &self.events
    }

    /// Get configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Active write policy
    pub fn write_policy(&self) -> WritePolicy {
        self.config.write_policy
    }

    /// Configured tiers, fastest first
    pub fn configured_tiers(&self) -> &[TierKind] {
        &self.configured
    }

    /// Number of queued durable writes
    pub fn write_back_pending(&self) -> usize {
        self.write_back.len()
    }

    /// Volatile tier, if configured
    pub fn volatile(&self) -> Option<&Arc<dyn VolatileStore>> {
        self.tiers.volatile.as_ref()
    }

    /// Durable tier, if configured
    pub fn durable(&self) -> Option<&Arc<dyn AsyncStore>> {
        self.tiers.durable.as_ref()
    }

    /// Shared tier, if configured
    pub fn shared(&self) -> Option<&Arc<dyn AsyncStore>> {
        self.tiers.shared.as_ref()
    }

    /// Stop the background write-back timer. Queued writes stay queued until
    /// the next explicit `flush()`.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn async_tiers(&self) -> impl Iterator<Item = (TierKind, &Arc<dyn AsyncStore>)> {
        [
            (TierKind::Durable, self.tiers.durable.as_ref()),
            (TierKind::Shared, self.tiers.shared.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, store)| store.map(|s| (kind, s)))
    }

    fn should_cache(&self, key: &str) -> bool {
        self.context
            .as_ref()
            .map_or(true, |policy| policy.should_cache(key))
    }

    fn adjust_ttl(&self, ttl: Option<Duration>, key: &str) -> Option<Duration> {
        match &self.context {
            Some(policy) => policy.adjust_ttl(ttl, key),
            None => ttl,
        }
    }

    fn emit_get(&self, key: &str, tier: Option<TierKind>) {
        self.events.emit(&CacheEvent::Get {
            key: key.to_string(),
            tier,
            timestamp: Utc::now(),
        });
    }

    fn report_error(&self, error: Error, operation: &'static str, key: Option<&str>) {
        self.metrics.record_error();
        warn!(operation, key, error = %error, "Cache operation failed");
        self.events.emit(&CacheEvent::Error {
            error: error.to_string(),
            operation: operation.to_string(),
            key: key.map(str::to_string),
            timestamp: Utc::now(),
        });
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// =============================================================================
// Tests
// =============================================================================
