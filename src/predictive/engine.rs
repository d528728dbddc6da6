//! Predictive Pre-Caching Engine
//!
//! Subscribes to the cache manager's read notifications, feeds every read key
//! into a [`PatternModel`], and on demand (or on a timer) pre-populates the
//! cache with the keys it expects next.
//!
//! Values come from registered [`PrefetchSource`]s. Sources race; the first
//! to produce a value wins. When none produces one before the fetch timeout, a
//! placeholder value is cached instead so prefetching never blocks for long.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::patterns::{PatternModel, Prediction};
use crate::cache::{CacheManager, EntrySource, SetOptions};
use crate::config::PredictiveConfig;
use crate::error::{Error, Result};
use crate::events::{CacheEvent, EventBus, SubscriptionId};

/// Tag carried by every pre-cached entry
pub const PRE_CACHE_TAG: &str = "preCache";

/// Supplies values for predicted keys
#[async_trait]
pub trait PrefetchSource: Send + Sync {
    /// Produce a value for `key`, or None to decline
    async fn fetch(&self, key: &str) -> Result<Option<Bytes>>;
}

/// [`PrefetchSource`] backed by an async closure
pub struct FnSource<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> PrefetchSource for FnSource<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Bytes>>> + Send,
{
    async fn fetch(&self, key: &str) -> Result<Option<Bytes>> {
        (self.f)(key.to_string()).await
    }
}

/// Wrap an async closure as a prefetch source
pub fn source_fn<F, Fut>(f: F) -> Arc<dyn PrefetchSource>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Bytes>>> + Send + 'static,
{
    Arc::new(FnSource { f })
}

/// Event emitted by the predictive engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PredictiveEvent {
    /// Predictions were recomputed after a read
    PredictionsUpdated {
        count: usize,
        top: Option<Prediction>,
        timestamp: DateTime<Utc>,
    },

    /// A predicted key was written into the cache
    PreCached {
        key: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// Pre-caching one key failed
    Error {
        error: String,
        key: String,
        timestamp: DateTime<Utc>,
    },
}

/// Point-in-time engine statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictiveStats {
    pub observed_accesses: u64,
    pub sequence_length: usize,
    pub patterns: usize,
    pub predictions: usize,
    pub pre_cached: u64,
    pub prefetch_failures: u64,
    pub sources: usize,
}

/// Predictive pre-caching engine
pub struct PredictiveCache {
    manager: Arc<CacheManager>,
    config: PredictiveConfig,
    model: Arc<Mutex<PatternModel>>,
    sources: RwLock<Vec<Arc<dyn PrefetchSource>>>,
    events: Arc<EventBus<PredictiveEvent>>,
    subscription: Mutex<Option<SubscriptionId>>,
    pre_cached: AtomicU64,
    prefetch_failures: AtomicU64,
    shutdown: CancellationToken,
}

impl PredictiveCache {
    /// Create an engine observing `manager`.
    ///
    /// When disabled, the engine never subscribes and predicts nothing. With a
    /// `prefetch_interval` configured, a background task calls
    /// [`trigger_pre_cache`](Self::trigger_pre_cache) on that period. Fails
    /// if `config` does not validate.
    pub fn new(manager: Arc<CacheManager>, config: PredictiveConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let model = Arc::new(Mutex::new(PatternModel::new(config.clone())));
        let events: Arc<EventBus<PredictiveEvent>> = Arc::new(EventBus::new());

        let subscription = config.enabled.then(|| {
            let model = Arc::clone(&model);
            let events = Arc::clone(&events);
            manager.events().subscribe(move |event: &CacheEvent| {
                if let CacheEvent::Get { key, timestamp, .. } = event {
                    let (count, top) = {
                        let mut model = model.lock();
                        let predictions = model.observe(key.clone(), *timestamp);
                        (predictions.len(), predictions.first().cloned())
                    };
                    events.emit(&PredictiveEvent::PredictionsUpdated {
                        count,
                        top,
                        timestamp: Utc::now(),
                    });
                }
            })
        });

        let engine = Arc::new(Self {
            manager,
            config,
            model,
            sources: RwLock::new(Vec::new()),
            events,
            subscription: Mutex::new(subscription),
            pre_cached: AtomicU64::new(0),
            prefetch_failures: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        });

        if engine.config.enabled {
            if let Some(period) = engine.config.prefetch_interval {
                engine.spawn_prefetch_loop(period);
            }
        }

        Ok(engine)
    }

    fn spawn_prefetch_loop(self: &Arc<Self>, period: std::time::Duration) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No Tokio runtime; pre-caching runs only on explicit trigger");
                return;
            }
        };

        let engine: Weak<Self> = Arc::downgrade(self);
        let token = self.shutdown.clone();

        handle.spawn(async move {
            info!(period_ms = period.as_millis() as u64, "Starting prefetch loop");

            let mut tick = interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        let Some(engine) = engine.upgrade() else {
                            break;
                        };
                        let count = engine.trigger_pre_cache().await;
                        if count > 0 {
                            debug!(count, "Background pre-cache pass");
                        }
                    }
                }
            }

            info!("Prefetch loop stopped");
        });
    }

    /// Register a source of values for predicted keys
    pub fn register_source(&self, source: Arc<dyn PrefetchSource>) {
        self.sources.write().push(source);
    }

    /// Current predictions, highest confidence first
    pub fn get_predictions(&self) -> Vec<Prediction> {
        self.model.lock().predictions().to_vec()
    }

    /// Pre-cache every predicted key not already in the cache.
    ///
    /// Returns how many keys were written. A failure on one key is reported
    /// and the remaining predictions are still processed.
    #[instrument(skip(self))]
    pub async fn trigger_pre_cache(&self) -> usize {
        let predictions = self.get_predictions();
        let mut count = 0;

        for prediction in predictions {
            if self.manager.has(&prediction.key).await {
                continue;
            }

            match self.pre_cache(&prediction).await {
                Ok(true) => {
                    count += 1;
                    self.pre_cached.fetch_add(1, Ordering::Relaxed);
                    self.events.emit(&PredictiveEvent::PreCached {
                        key: prediction.key.clone(),
                        confidence: prediction.confidence,
                        timestamp: Utc::now(),
                    });
                }
                Ok(false) => {
                    debug!(key = %prediction.key, "Cache declined pre-cached value");
                }
                Err(e) => {
                    self.prefetch_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %prediction.key, error = %e, "Pre-cache failed");
                    self.events.emit(&PredictiveEvent::Error {
                        error: e.to_string(),
                        key: prediction.key.clone(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        count
    }

    async fn pre_cache(&self, prediction: &Prediction) -> Result<bool> {
        let value = self.fetch_value(&prediction.key).await?;
        let options = SetOptions::new()
            .tags([PRE_CACHE_TAG])
            .source(EntrySource::PredictivePreCache)
            .attribute("confidence", prediction.confidence)
            .attribute("prefix", prediction.prefix.clone());

        Ok(self.manager.set(&prediction.key, value, options).await)
    }

    /// Race the registered sources for `key`
    async fn fetch_value(&self, key: &str) -> Result<Bytes> {
        let sources: Vec<Arc<dyn PrefetchSource>> = self.sources.read().clone();
        if sources.is_empty() {
            return Ok(placeholder(key));
        }

        let race = async {
            let mut pending: FuturesUnordered<_> =
                sources.iter().map(|source| source.fetch(key)).collect();
            let mut declined = false;
            let mut failure = None;

            while let Some(result) = pending.next().await {
                match result {
                    Ok(Some(value)) => return Ok(Some(value)),
                    Ok(None) => declined = true,
                    Err(e) => failure = Some(e),
                }
            }

            match failure {
                Some(e) if !declined => Err::<Option<Bytes>, Error>(e),
                _ => Ok(None),
            }
        };

        match tokio::time::timeout(self.config.fetch_timeout, race).await {
            Ok(Ok(Some(value))) => Ok(value),
            Ok(Ok(None)) => Ok(placeholder(key)),
            Ok(Err(e)) => Err(Error::Prefetch {
                key: key.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => {
                debug!(key, "Prefetch sources timed out, using placeholder");
                Ok(placeholder(key))
            }
        }
    }

    /// Engine notification channel
    pub fn events(&self) -> &EventBus<PredictiveEvent> {
        &self.events
    }

    pub fn config(&self) -> &PredictiveConfig {
        &self.config
    }

    /// Get a statistics snapshot
    pub fn stats(&self) -> PredictiveStats {
        let model = self.model.lock();
        PredictiveStats {
            observed_accesses: model.observed(),
            sequence_length: model.sequence_len(),
            patterns: model.pattern_count(),
            predictions: model.predictions().len(),
            pre_cached: self.pre_cached.load(Ordering::Relaxed),
            prefetch_failures: self.prefetch_failures.load(Ordering::Relaxed),
            sources: self.sources.read().len(),
        }
    }

    /// Whether the engine is still listening to the cache manager
    pub fn is_active(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Stop observing, stop the prefetch loop and discard learned state
    pub fn dispose(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.manager.events().unsubscribe(id);
        }
        self.shutdown.cancel();
        self.sources.write().clear();
        self.model.lock().reset();
        debug!("Predictive engine disposed");
    }
}

impl Drop for PredictiveCache {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.get_mut().take() {
            self.manager.events().unsubscribe(id);
        }
        self.shutdown.cancel();
    }
}

fn placeholder(key: &str) -> Bytes {
    Bytes::from(format!("fetched:{}", key))
}

// =============================================================================
// Tests
// =============================================================================
