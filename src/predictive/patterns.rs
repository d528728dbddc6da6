//! Access Pattern Model
//!
//! Learns variable-length key sequences from the stream of reads and turns
//! them into next-key predictions.
//!
//! A *prefix* is 1 to `max_sequence_length - 1` consecutive keys joined with a
//! comma; each prefix maps to the keys seen right after it, weighted by a
//! decayed count (`count = count * decay + 1`). Confidence for a suffix is its
//! count divided by the total for the prefix.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::PredictiveConfig;

/// Separator between keys in a prefix
pub const PREFIX_SEPARATOR: &str = ",";

/// The sequence is trimmed once it grows past this many times the max length
const TRIM_TRIGGER_FACTOR: usize = 10;

/// Multiple of the max length kept after trimming
const TRIM_KEEP_FACTOR: usize = 5;

/// A key read through the cache manager
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEvent {
    pub key: String,
    pub timestamp: DateTime<Utc>,
}

/// A key expected to be read soon
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Predicted key
    pub key: String,
    /// Pattern prefix that produced the prediction
    pub prefix: String,
    /// Suffix count / prefix total, in [0, 1]
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

type SuffixCounts = HashMap<String, f64>;

/// Sequence, pattern table and current predictions
#[derive(Debug)]
pub struct PatternModel {
    config: PredictiveConfig,
    sequence: VecDeque<AccessEvent>,
    patterns: HashMap<String, SuffixCounts>,
    predictions: Vec<Prediction>,
    observed: u64,
}

impl PatternModel {
    /// Create an empty model
    pub fn new(config: PredictiveConfig) -> Self {
        Self {
            config,
            sequence: VecDeque::new(),
            patterns: HashMap::new(),
            predictions: Vec::new(),
            observed: 0,
        }
    }

    /// Record an access, relearn patterns and recompute predictions
    pub fn observe(&mut self, key: impl Into<String>, timestamp: DateTime<Utc>) -> &[Prediction] {
        self.observed += 1;
        self.sequence.push_back(AccessEvent {
            key: key.into(),
            timestamp,
        });
        self.trim_sequence();
        self.update_patterns();
        self.recompute(timestamp);
        &self.predictions
    }

    fn trim_sequence(&mut self) {
        let max = self.config.max_sequence_length;
        if self.sequence.len() > max * TRIM_TRIGGER_FACTOR {
            let excess = self.sequence.len() - max * TRIM_KEEP_FACTOR;
            self.sequence.drain(..excess);
        }
    }

    /// Apply the decayed increment for every window of every length
    fn update_patterns(&mut self) {
        let keys: Vec<&str> = self.sequence.iter().map(|e| e.key.as_str()).collect();
        let decay = self.config.decay_factor;

        for length in 2..=self.config.max_sequence_length {
            for window in keys.windows(length) {
                let (prefix, suffix) = window.split_at(length - 1);
                bump(
                    &mut self.patterns,
                    prefix.join(PREFIX_SEPARATOR),
                    suffix[0],
                    decay,
                );
            }
        }

        if self.patterns.len() > self.config.max_predictions * 2 {
            self.prune();
        }
    }

    /// Drop roughly the lowest-weighted fifth of prefixes
    fn prune(&mut self) {
        let mut totals: Vec<(String, f64)> = self
            .patterns
            .iter()
            .map(|(prefix, suffixes)| (prefix.clone(), suffixes.values().sum()))
            .collect();
        totals.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        let remove = (totals.len() / 5).max(1);
        for (prefix, _) in totals.into_iter().take(remove) {
            self.patterns.remove(&prefix);
        }
    }

    fn recompute(&mut self, timestamp: DateTime<Utc>) {
        let mut best: HashMap<String, Prediction> = HashMap::new();
        let longest = self.config.max_sequence_length.min(self.sequence.len());

        for length in 1..=longest {
            let prefix = self
                .sequence
                .iter()
                .skip(self.sequence.len() - length)
                .map(|e| e.key.as_str())
                .collect::<Vec<_>>()
                .join(PREFIX_SEPARATOR);

            let Some(suffixes) = self.patterns.get(&prefix) else {
                continue;
            };
            let total: f64 = suffixes.values().sum();
            if total <= 0.0 {
                continue;
            }

            for (key, count) in suffixes {
                let confidence = count / total;
                if confidence < self.config.confidence_threshold {
                    continue;
                }
                let keep = best
                    .get(key)
                    .map_or(true, |existing| confidence > existing.confidence);
                if keep {
                    best.insert(
                        key.clone(),
                        Prediction {
                            key: key.clone(),
                            prefix: prefix.clone(),
                            confidence,
                            timestamp,
                        },
                    );
                }
            }
        }

        let mut predictions: Vec<Prediction> = best.into_values().collect();
        predictions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        predictions.truncate(self.config.max_predictions);
        self.predictions = predictions;
    }

    /// Apply one decayed increment to `prefix -> suffix`
    pub fn record(&mut self, prefix: &str, suffix: &str) {
        bump(
            &mut self.patterns,
            prefix.to_string(),
            suffix,
            self.config.decay_factor,
        );
    }

    /// Decayed count for `prefix -> suffix`
    pub fn count(&self, prefix: &str, suffix: &str) -> Option<f64> {
        self.patterns.get(prefix)?.get(suffix).copied()
    }

    /// Current predictions, highest confidence first
    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    /// Recent accesses, oldest first
    pub fn sequence(&self) -> impl Iterator<Item = &AccessEvent> {
        self.sequence.iter()
    }

    pub fn sequence_len(&self) -> usize {
        self.sequence.len()
    }

    /// Number of distinct prefixes
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Accesses observed since creation or the last reset
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Discard everything learned
    pub fn reset(&mut self) {
        self.sequence.clear();
        self.patterns.clear();
        self.predictions.clear();
        self.observed = 0;
    }
}

fn bump(patterns: &mut HashMap<String, SuffixCounts>, prefix: String, suffix: &str, decay: f64) {
    let count = patterns
        .entry(prefix)
        .or_default()
        .entry(suffix.to_string())
        .or_insert(0.0);
    *count = *count * decay + 1.0;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn model(max_sequence_length: usize) -> PatternModel {
        PatternModel::new(PredictiveConfig {
            max_sequence_length,
            ..Default::default()
        })
    }

    fn feed(model: &mut PatternModel, keys: &[&str]) {
        for key in keys {
            model.observe(*key, Utc::now());
        }
    }

    #[test]
    fn test_decayed_count_increases_and_converges() {
        let mut model = model(2);
        let limit = 1.0 / (1.0 - 0.95);

        let mut previous = 0.0;
        for _ in 0..500 {
            model.record("X", "Y");
            let count = model.count("X", "Y").unwrap();
            assert!(count > previous);
            assert!(count < limit);
            previous = count;
        }
        assert!((limit - previous).abs() < 1e-6);
    }

    #[test]
    fn test_observed_pairs_converge_under_decay() {
        let mut model = model(2);
        let limit = 1.0 / (1.0 - 0.95);

        model.observe("X", Utc::now());
        assert!(model.count("X", "Y").is_none());

        let mut previous = 0.0;
        for _ in 0..300 {
            model.observe("X", Utc::now());
            model.observe("Y", Utc::now());
            let count = model.count("X", "Y").unwrap();
            if previous < limit - 1e-6 {
                assert!(count > previous, "{} did not grow past {}", count, previous);
            } else {
                assert!(count >= previous - 1e-9);
            }
            assert!(count <= limit + 1e-9, "{} exceeded {}", count, limit);
            previous = count;
        }
        assert!((limit - previous).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_filters_low_confidence() {
        let mut model = PatternModel::new(PredictiveConfig {
            confidence_threshold: 0.6,
            decay_factor: 1.0,
            ..Default::default()
        });
        for _ in 0..3 {
            model.record("X", "Y");
        }
        for _ in 0..2 {
            model.record("X", "Z");
        }

        model.observe("X", Utc::now());
        let keys: Vec<&str> = model.predictions().iter().map(|p| p.key.as_str()).collect();
        assert!(keys.contains(&"Y"));
        assert!(!keys.contains(&"Z"));
    }

    #[test]
    fn test_windows_of_every_length_are_learned() {
        let mut model = model(3);
        feed(&mut model, &["a", "b", "c"]);

        assert!(model.count("a", "b").is_some());
        assert!(model.count("b", "c").is_some());
        assert!(model.count("a,b", "c").is_some());
        assert!(model.count("a,b,c", "d").is_none());
    }

    #[test]
    fn test_predicts_follower_of_latest_key() {
        let mut model = model(3);
        feed(&mut model, &["a", "b", "a", "b", "a"]);

        let predictions = model.predictions();
        assert_eq!(predictions[0].key, "b");
        assert_eq!(predictions[0].confidence, 1.0);
    }

    #[test]
    fn test_predictions_dedupe_by_key() {
        let mut model = model(3);
        feed(&mut model, &["a", "b", "a", "b", "a"]);

        // "a -> b" and "b,a -> b" both predict b
        let count = model.predictions().iter().filter(|p| p.key == "b").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_predictions_sorted_and_capped() {
        let mut model = PatternModel::new(PredictiveConfig {
            confidence_threshold: 0.0,
            max_predictions: 2,
            decay_factor: 1.0,
            ..Default::default()
        });
        for (suffix, times) in [("p", 1), ("q", 3), ("r", 2)] {
            for _ in 0..times {
                model.record("X", suffix);
            }
        }

        model.observe("X", Utc::now());
        let keys: Vec<&str> = model.predictions().iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["q", "r"]);
        assert!(model.predictions()[0].confidence >= model.predictions()[1].confidence);
    }

    #[test]
    fn test_sequence_is_trimmed() {
        let mut model = model(2);
        for i in 0..21 {
            model.observe(format!("k{}", i), Utc::now());
        }

        // 21 > 10 * 2, trimmed back to 5 * 2
        assert_eq!(model.sequence_len(), 10);
        assert_eq!(model.sequence().next().unwrap().key, "k11");
        assert_eq!(model.observed(), 21);
    }

    #[test]
    fn test_pattern_table_is_pruned() {
        let mut model = PatternModel::new(PredictiveConfig {
            max_predictions: 2,
            max_sequence_length: 2,
            ..Default::default()
        });
        for i in 0..6 {
            model.observe(format!("k{}", i), Utc::now());
        }

        // Five prefixes exceed 2 * 2; the lightest (newest) one goes
        assert_eq!(model.pattern_count(), 4);
        assert!(model.count("k4", "k5").is_none());
        assert!(model.count("k0", "k1").is_some());
    }

    #[test]
    fn test_reset_discards_state() {
        let mut model = model(3);
        feed(&mut model, &["a", "b", "a", "b"]);
        assert!(!model.predictions().is_empty());

        model.reset();
        assert_eq!(model.sequence_len(), 0);
        assert_eq!(model.pattern_count(), 0);
        assert!(model.predictions().is_empty());
    }
}
