//! Predictive Pre-Caching
//!
//! ```text
//! CacheManager ──get events──▶ PatternModel ──predictions──▶ trigger_pre_cache
//!       ▲                                                          │
//!       └──────────── set(tags=["preCache"]) ◀── PrefetchSource ◀──┘
//! ```
//!
//! Learned state lives only in memory; it is discarded on `dispose()`.

mod engine;
mod patterns;

pub use engine::{
    source_fn, FnSource, PredictiveCache, PredictiveEvent, PredictiveStats, PrefetchSource,
    PRE_CACHE_TAG,
};
pub use patterns::{AccessEvent, PatternModel, Prediction, PREFIX_SEPARATOR};
