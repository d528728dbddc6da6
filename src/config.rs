//! Cache Configuration
//!
//! Constructor-time options for the cache manager and the predictive engine.
//! Every field has a documented default, and the whole tree can be loaded from
//! YAML:
//!
//! ```yaml
//! writePolicy: write-back
//! writeBackDelay: 500ms
//! shared:
//!   enabled: true
//! predictive:
//!   maxSequenceLength: 3
//!   confidenceThreshold: 0.6
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{ContextRules, WritePolicy};
use crate::error::{Error, Result};

/// Default write-back flush delay
pub const DEFAULT_WRITE_BACK_DELAY: Duration = Duration::from_millis(1000);

/// Default deadline for prefetch source races
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default bound on volatile tier entries
pub const DEFAULT_VOLATILE_MAX_ENTRIES: usize = 10_000;

/// Per-tier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TierConfig {
    /// Whether the tier participates in the cache
    pub enabled: bool,
    /// Bound on stored entries for in-memory tiers (None = unbounded)
    pub max_entries: Option<usize>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self::enabled()
    }
}

impl TierConfig {
    /// Enabled, unbounded tier
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            max_entries: None,
        }
    }

    /// Disabled tier
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_entries: None,
        }
    }
}

/// Predictive pre-caching configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PredictiveConfig {
    /// Whether the engine observes accesses
    pub enabled: bool,
    /// Minimum confidence for a prediction to survive
    pub confidence_threshold: f64,
    /// Cap on the prediction list
    pub max_predictions: usize,
    /// Longest learned access sequence (prefix + next key)
    pub max_sequence_length: usize,
    /// Multiplicative discount applied to historical pattern counts
    pub decay_factor: f64,
    /// Deadline for prefetch sources before a placeholder value is used
    #[serde(with = "duration_str")]
    pub fetch_timeout: Duration,
    /// Period of the background pre-cache loop (None = manual only)
    #[serde(with = "duration_str::option")]
    pub prefetch_interval: Option<Duration>,
}

impl Default for PredictiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: 0.5,
            max_predictions: 100,
            max_sequence_length: 5,
            decay_factor: 0.95,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            prefetch_interval: None,
        }
    }
}

impl PredictiveConfig {
    /// Validate ranges
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidenceThreshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            return Err(Error::Config(format!(
                "decayFactor must be within (0, 1], got {}",
                self.decay_factor
            )));
        }
        if self.max_sequence_length < 2 {
            return Err(Error::Config(format!(
                "maxSequenceLength must be at least 2, got {}",
                self.max_sequence_length
            )));
        }
        if self.max_predictions == 0 {
            return Err(Error::Config("maxPredictions must be at least 1".to_string()));
        }
        if matches!(self.prefetch_interval, Some(d) if d.is_zero()) {
            return Err(Error::Config("prefetchInterval must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Cache manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Durable-tier write policy
    pub write_policy: WritePolicy,
    /// Period of the write-back flush timer
    #[serde(with = "duration_str")]
    pub write_back_delay: Duration,
    /// Volatile tier
    pub volatile: TierConfig,
    /// Durable tier
    pub durable: TierConfig,
    /// Shared tier
    pub shared: TierConfig,
    /// Rule-based context policy (None = cache everything, TTLs unchanged)
    pub context: Option<ContextRules>,
    /// Predictive engine
    pub predictive: PredictiveConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            write_policy: WritePolicy::default(),
            write_back_delay: DEFAULT_WRITE_BACK_DELAY,
            volatile: TierConfig {
                enabled: true,
                max_entries: Some(DEFAULT_VOLATILE_MAX_ENTRIES),
            },
            durable: TierConfig::enabled(),
            shared: TierConfig::disabled(),
            context: None,
            predictive: PredictiveConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Parse from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: CacheConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Validate ranges
    pub fn validate(&self) -> Result<()> {
        if self.write_back_delay.is_zero() {
            return Err(Error::Config("writeBackDelay must be non-zero".to_string()));
        }
        if let Some(context) = &self.context {
            context.validate()?;
        }
        self.predictive.validate()
    }

    /// Set the write policy
    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }
}

/// Parse a duration string such as `500ms`, `30s`, `1h30m` or `2d`.
///
/// A bare number is read as milliseconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::DurationParse("empty duration string".to_string()));
    }

    let mut total_ms: u64 = 0;
    let mut num_buf = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            num_buf.push(c);
            continue;
        }

        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        num_buf.clear();

        let multiplier = match c {
            'm' | 'M' if chars.peek().is_some_and(|n| *n == 's' || *n == 'S') => {
                chars.next();
                1
            }
            's' | 'S' => 1_000,
            'm' | 'M' => 60_000,
            'h' | 'H' => 3_600_000,
            'd' | 'D' => 86_400_000,
            _ => {
                return Err(Error::DurationParse(format!(
                    "unknown duration unit: {}",
                    c
                )))
            }
        };

        total_ms = num
            .checked_mul(multiplier)
            .and_then(|v| total_ms.checked_add(v))
            .ok_or_else(|| Error::DurationParse(format!("duration overflow: {}", s)))?;
    }

    // Trailing number without a unit: milliseconds
    if !num_buf.is_empty() {
        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        total_ms = total_ms
            .checked_add(num)
            .ok_or_else(|| Error::DurationParse(format!("duration overflow: {}", s)))?;
    }

    Ok(Duration::from_millis(total_ms))
}

/// Serde adapter: durations as `"1000ms"` strings, accepting strings or integer milliseconds
pub mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    fn from_raw<E: serde::de::Error>(raw: Raw) -> Result<Duration, E> {
        match raw {
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
            Raw::Text(text) => super::parse_duration(&text).map_err(E::custom),
        }
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}ms", value.as_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        from_raw(Raw::deserialize(deserializer)?)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&format!("{}ms", d.as_millis())),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<super::Raw>::deserialize(deserializer)?
                .map(super::from_raw)
                .transpose()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
