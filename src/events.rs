//! Notification Channel
//!
//! Synchronous fan-out of cache and predictive-engine events. Subscribers run
//! on the emitting task, in emission order, so an observer such as the
//! predictive engine sees exactly the sequence of reads the manager served.
//!
//! # Example
//!
//! ```ignore
//! let id = manager.events().subscribe(|event: &CacheEvent| {
//!     if let CacheEvent::Get { key, tier, .. } = event {
//!         println!("{} served by {:?}", key, tier);
//!     }
//! });
//! manager.events().unsubscribe(id);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{EntrySource, TierKind};

/// Handle returned by [`EventBus::subscribe`]
pub type SubscriptionId = u64;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Synchronous event bus
pub struct EventBus<E> {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Listener<E>)>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<E> EventBus<E> {
    /// Create a bus with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it receives every subsequent event
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener, returning whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Deliver an event to every listener, in subscription order
    pub fn emit(&self, event: &E) {
        // Snapshot so listeners may (un)subscribe while handling
        let listeners: Vec<Listener<E>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Event emitted by the cache manager
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CacheEvent {
    /// A read attempt; `tier` is None on a miss
    Get {
        key: String,
        tier: Option<TierKind>,
        timestamp: DateTime<Utc>,
    },

    /// A successful write
    Set {
        key: String,
        value: Bytes,
        tags: Vec<String>,
        source: EntrySource,
        timestamp: DateTime<Utc>,
    },

    /// A delete request; `existed` is true when any tier held the key
    Delete {
        key: String,
        existed: bool,
        timestamp: DateTime<Utc>,
    },

    /// Every tier and the write-back queue were emptied
    Clear { timestamp: DateTime<Utc> },

    /// The write-back queue was drained
    Flush {
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A best-effort path failed
    Error {
        error: String,
        operation: String,
        key: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl CacheEvent {
    /// Event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Get { .. } => "get",
            CacheEvent::Set { .. } => "set",
            CacheEvent::Delete { .. } => "delete",
            CacheEvent::Clear { .. } => "clear",
            CacheEvent::Flush { .. } => "flush",
            CacheEvent::Error { .. } => "error",
        }
    }

    /// Key the event refers to, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::Get { key, .. }
            | CacheEvent::Set { key, .. }
            | CacheEvent::Delete { key, .. } => Some(key),
            CacheEvent::Error { key, .. } => key.as_deref(),
            CacheEvent::Clear { .. } | CacheEvent::Flush { .. } => None,
        }
    }
}

/// Attach a listener that traces every cache event as JSON
pub fn log_events(bus: &EventBus<CacheEvent>) -> SubscriptionId {
    bus.subscribe(|event: &CacheEvent| {
        let event_type = event.event_type();
        let json = serde_json::to_string(event).unwrap_or_else(|_| format!("{:?}", event));
        if matches!(event, CacheEvent::Error { .. }) {
            warn!(event_type = %event_type, event = %json, "Cache event");
        } else {
            debug!(event_type = %event_type, event = %json, "Cache event");
        }
    })
}

/// In-memory event collector for testing.
///
/// Collects events in memory for later inspection.
#[derive(Debug)]
pub struct EventCollector<E> {
    events: Arc<RwLock<Vec<E>>>,
}

impl<E> Clone for EventCollector<E> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<E: Clone + Send + Sync + 'static> EventCollector<E> {
    /// Subscribe a new collector to `bus`
    pub fn attach(bus: &EventBus<E>) -> (Self, SubscriptionId) {
        let collector = Self {
            events: Arc::new(RwLock::new(Vec::new())),
        };
        let sink = Arc::clone(&collector.events);
        let id = bus.subscribe(move |event: &E| sink.write().push(event.clone()));
        (collector, id)
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<E> {
        self.events.read().clone()
    }

    /// Get the count of collected events
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if there are no events
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Events matching a predicate
    pub fn matching<P>(&self, predicate: P) -> Vec<E>
    where
        P: Fn(&E) -> bool,
    {
        self.events
            .read()
            .iter()
            .filter(|e| predicate(*e))
            .cloned()
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
