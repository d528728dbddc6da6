//! Cache Metrics Collection
//!
//! Lock-free running counters for hits, misses and operations, plus a
//! serializable snapshot that can be rendered in Prometheus text format.

use std::sync::atomic::{AtomicU64, Ordering};

use prometheus::{Encoder, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use super::tier::TierKind;

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // Per-tier lookups
    volatile_hits: AtomicU64,
    volatile_misses: AtomicU64,
    durable_hits: AtomicU64,
    durable_misses: AtomicU64,
    shared_hits: AtomicU64,
    shared_misses: AtomicU64,

    // Totals
    total_hits: AtomicU64,
    total_misses: AtomicU64,

    // Operations
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    flushes: AtomicU64,
    promotions: AtomicU64,
    errors: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    fn hits_for(&self, tier: TierKind) -> &AtomicU64 {
        match tier {
            TierKind::Volatile => &self.volatile_hits,
            TierKind::Durable => &self.durable_hits,
            TierKind::Shared => &self.shared_hits,
        }
    }

    fn misses_for(&self, tier: TierKind) -> &AtomicU64 {
        match tier {
            TierKind::Volatile => &self.volatile_misses,
            TierKind::Durable => &self.durable_misses,
            TierKind::Shared => &self.shared_misses,
        }
    }

    /// Record a hit served by `tier`
    pub fn record_hit(&self, tier: TierKind) {
        self.hits_for(tier).fetch_add(1, Ordering::Relaxed);
        self.total_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a full miss across the configured tiers
    pub fn record_miss(&self, tiers: &[TierKind]) {
        for tier in tiers {
            self.misses_for(*tier).fetch_add(1, Ordering::Relaxed);
        }
        self.total_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_hits(&self) -> u64 {
        self.total_hits.load(Ordering::Relaxed)
    }

    pub fn total_misses(&self) -> u64 {
        self.total_misses.load(Ordering::Relaxed)
    }

    /// Total hits ÷ (hits + misses), 0 before any lookup
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.total_hits() as f64;
        let total = hits + self.total_misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self, write_back_pending: usize) -> CacheStats {
        CacheStats {
            volatile_hits: self.volatile_hits.load(Ordering::Relaxed),
            volatile_misses: self.volatile_misses.load(Ordering::Relaxed),
            durable_hits: self.durable_hits.load(Ordering::Relaxed),
            durable_misses: self.durable_misses.load(Ordering::Relaxed),
            shared_hits: self.shared_hits.load(Ordering::Relaxed),
            shared_misses: self.shared_misses.load(Ordering::Relaxed),
            total_hits: self.total_hits(),
            total_misses: self.total_misses(),
            gets: self.gets.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            write_back_pending: write_back_pending as u64,
            hit_ratio: self.hit_ratio(),
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub volatile_hits: u64,
    pub volatile_misses: u64,
    pub durable_hits: u64,
    pub durable_misses: u64,
    pub shared_hits: u64,
    pub shared_misses: u64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    pub flushes: u64,
    pub promotions: u64,
    pub errors: u64,
    /// Entries waiting in the write-back queue
    pub write_back_pending: u64,
    /// Total hits ÷ (hits + misses)
    pub hit_ratio: f64,
}

impl CacheStats {
    /// Hits served by `tier`
    pub fn hits(&self, tier: TierKind) -> u64 {
        match tier {
            TierKind::Volatile => self.volatile_hits,
            TierKind::Durable => self.durable_hits,
            TierKind::Shared => self.shared_hits,
        }
    }

    /// Misses recorded against `tier`
    pub fn misses(&self, tier: TierKind) -> u64 {
        match tier {
            TierKind::Volatile => self.volatile_misses,
            TierKind::Durable => self.durable_misses,
            TierKind::Shared => self.shared_misses,
        }
    }

    /// Render the snapshot in Prometheus text exposition format
    pub fn to_prometheus(&self) -> crate::error::Result<String> {
        let registry = Registry::new_custom(Some("tiercache".to_string()), None)?;

        for tier in TierKind::ALL {
            let hits = IntGauge::with_opts(
                Opts::new("tier_hits", "Lookups served by the tier").const_label("tier", tier.as_str()),
            )?;
            hits.set(self.hits(tier) as i64);
            registry.register(Box::new(hits))?;

            let misses = IntGauge::with_opts(
                Opts::new("tier_misses", "Full misses recorded against the tier")
                    .const_label("tier", tier.as_str()),
            )?;
            misses.set(self.misses(tier) as i64);
            registry.register(Box::new(misses))?;
        }

        let scalars: [(&str, &str, u64); 9] = [
            ("hits_total", "Total cache hits", self.total_hits),
            ("misses_total", "Total cache misses", self.total_misses),
            ("gets_total", "Get operations", self.gets),
            ("sets_total", "Set operations", self.sets),
            ("deletes_total", "Delete operations", self.deletes),
            ("flushes_total", "Write-back flushes", self.flushes),
            ("promotions_total", "Promotion writes into faster tiers", self.promotions),
            ("errors_total", "Tier, fetch and flush failures", self.errors),
            ("write_back_pending", "Entries waiting in the write-back queue", self.write_back_pending),
        ];
        for (name, help, value) in scalars {
            let gauge = IntGauge::new(name, help)?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge))?;
        }

        let ratio = prometheus::Gauge::new("hit_ratio", "Total hits / (hits + misses)")?;
        ratio.set(self.hit_ratio);
        registry.register(Box::new(ratio))?;

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::error::Error::Internal(e.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================
