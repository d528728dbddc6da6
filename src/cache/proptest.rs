//! Property-Based Tests for the Cache Manager
//!
//! # Test Properties
//!
//! 1. **Hit Ratio**: reported ratio equals hits / (hits + misses) for any trace
//! 2. **Tag Deletion**: after `delete_by_tag`, no tagged key remains readable
//! 3. **Idempotent Delete**: a second delete of the same key reports false
//! 4. **Write Policies**: every policy leaves a set value readable

#![cfg(test)]

use bytes::Bytes;
use proptest::prelude::*;

use super::{CacheManager, GetOptions, SetOptions, WritePolicy};
use crate::config::{CacheConfig, TierConfig};

// =============================================================================
// Property Strategies
// =============================================================================

/// Keys drawn from a small alphabet so traces revisit keys.
fn key_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d", "e", "f"]).prop_map(str::to_string)
}

#[derive(Debug, Clone)]
enum Op {
    Get(String),
    Set(String),
    Delete(String),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        key_strategy().prop_map(Op::Get),
        key_strategy().prop_map(Op::Set),
        key_strategy().prop_map(Op::Delete),
    ]
}

fn policy_strategy() -> impl Strategy<Value = WritePolicy> {
    prop_oneof![
        Just(WritePolicy::WriteThrough),
        Just(WritePolicy::WriteBack),
        Just(WritePolicy::WriteAround),
    ]
}

fn config(policy: WritePolicy) -> CacheConfig {
    let mut config = CacheConfig::default().with_write_policy(policy);
    config.shared = TierConfig::enabled();
    config
}

// =============================================================================
// Manager Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: hit ratio matches the hits and misses observed by callers.
    #[test]
    fn prop_hit_ratio_matches_trace(
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let (hits, misses, stats) = tokio_test::block_on(async {
            let manager = CacheManager::in_memory(config(WritePolicy::WriteThrough)).unwrap();
            let (mut hits, mut misses) = (0u64, 0u64);

            for op in &ops {
                match op {
                    Op::Get(key) => match manager.get(key, &GetOptions::new()).await {
                        Some(_) => hits += 1,
                        None => misses += 1,
                    },
                    Op::Set(key) => {
                        manager.set(key, Bytes::from(key.clone()), SetOptions::new()).await;
                    }
                    Op::Delete(key) => {
                        manager.delete(key).await;
                    }
                }
            }
            (hits, misses, manager.stats())
        });

        prop_assert_eq!(stats.total_hits, hits);
        prop_assert_eq!(stats.total_misses, misses);
        let expected = if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        };
        prop_assert!((stats.hit_ratio - expected).abs() < 1e-12);
    }

    /// Property: tag deletion removes exactly the tagged keys.
    #[test]
    fn prop_delete_by_tag_removes_tagged(
        policy in policy_strategy(),
        tagged in prop::collection::btree_set(key_strategy(), 0..6),
    ) {
        let remaining = tokio_test::block_on(async {
            let manager = CacheManager::in_memory(config(policy)).unwrap();
            for key in ["a", "b", "c", "d", "e", "f"] {
                let options = if tagged.contains(key) {
                    SetOptions::new().tags(["T"])
                } else {
                    SetOptions::new()
                };
                manager.set(key, Bytes::from_static(b"v"), options).await;
            }

            let deleted = manager.delete_by_tag("T").await;
            assert_eq!(deleted, tagged.len());

            let mut remaining = Vec::new();
            for key in ["a", "b", "c", "d", "e", "f"] {
                if manager.get(key, &GetOptions::new()).await.is_some() {
                    remaining.push(key.to_string());
                }
            }
            remaining
        });

        for key in &remaining {
            prop_assert!(!tagged.contains(key));
        }
        prop_assert_eq!(remaining.len(), 6 - tagged.len());
    }

    /// Property: delete is idempotent under every write policy.
    #[test]
    fn prop_delete_idempotent(
        policy in policy_strategy(),
        key in key_strategy(),
    ) {
        let (first, second, readable) = tokio_test::block_on(async {
            let manager = CacheManager::in_memory(config(policy)).unwrap();
            manager.set(&key, Bytes::from_static(b"v"), SetOptions::new()).await;
            let first = manager.delete(&key).await;
            let second = manager.delete(&key).await;
            let readable = manager.has(&key).await;
            (first, second, readable)
        });

        prop_assert!(first);
        prop_assert!(!second);
        prop_assert!(!readable);
    }

    /// Property: the last value set is the value read back.
    #[test]
    fn prop_last_write_wins(
        policy in policy_strategy(),
        values in prop::collection::vec(any::<u32>(), 1..8),
    ) {
        let read = tokio_test::block_on(async {
            let manager = CacheManager::in_memory(config(policy)).unwrap();
            for value in &values {
                manager
                    .set("k", Bytes::from(value.to_string()), SetOptions::new())
                    .await;
            }
            manager.get("k", &GetOptions::new()).await.map(|hit| hit.value)
        });

        let expected = values.last().map(|v| Bytes::from(v.to_string()));
        prop_assert_eq!(read, expected);
    }
}
