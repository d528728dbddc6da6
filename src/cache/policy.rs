//! Write and Context Policies
//!
//! [`WritePolicy`] decides how the durable tier follows a `set`. The
//! [`ContextPolicy`] hook lets the surrounding application veto caching of a
//! key or rescale a requested TTL.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Durable-tier write policy, fixed per manager instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Durable tier written synchronously with the volatile tier
    #[default]
    WriteThrough,
    /// Durable tier written later by a batched, timer-driven flush
    WriteBack,
    /// Durable tier skipped on write; filled only by promotion
    WriteAround,
}

impl WritePolicy {
    /// Whether `set` writes the durable tier immediately
    pub fn writes_durable_now(&self) -> bool {
        matches!(self, WritePolicy::WriteThrough)
    }

    /// Whether `set` queues the durable write
    pub fn defers_durable(&self) -> bool {
        matches!(self, WritePolicy::WriteBack)
    }

    /// Whether a shared-tier hit is promoted into the durable tier
    pub fn promotes_to_durable(&self) -> bool {
        !matches!(self, WritePolicy::WriteAround)
    }
}

impl std::fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WritePolicy::WriteThrough => write!(f, "write-through"),
            WritePolicy::WriteBack => write!(f, "write-back"),
            WritePolicy::WriteAround => write!(f, "write-around"),
        }
    }
}

impl std::str::FromStr for WritePolicy {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "write-through" | "writethrough" => Ok(WritePolicy::WriteThrough),
            "write-back" | "writeback" => Ok(WritePolicy::WriteBack),
            "write-around" | "writearound" => Ok(WritePolicy::WriteAround),
            other => Err(crate::error::Error::Config(format!(
                "unknown write policy: {}",
                other
            ))),
        }
    }
}

/// Context-aware caching hook.
///
/// Both methods are synchronous and must not have side effects visible to the
/// manager.
pub trait ContextPolicy: Send + Sync {
    /// Whether `key` may be cached at all
    fn should_cache(&self, key: &str) -> bool;

    /// Rescale the TTL requested for `key`
    fn adjust_ttl(&self, ttl: Option<Duration>, key: &str) -> Option<Duration>;
}

/// Rule-based context policy.
///
/// Denies keys by prefix, scales every TTL by a factor and optionally caps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextRules {
    /// Keys starting with any of these prefixes are never cached
    pub deny_prefixes: Vec<String>,
    /// Multiplier applied to requested TTLs
    pub ttl_scale: f64,
    /// Upper bound on TTLs after scaling
    #[serde(with = "crate::config::duration_str::option")]
    pub max_ttl: Option<Duration>,
}

impl Default for ContextRules {
    fn default() -> Self {
        Self {
            deny_prefixes: Vec::new(),
            ttl_scale: 1.0,
            max_ttl: None,
        }
    }
}

impl ContextRules {
    /// Validate ranges
    pub fn validate(&self) -> crate::error::Result<()> {
        if !self.ttl_scale.is_finite() || self.ttl_scale < 0.0 {
            return Err(crate::error::Error::Config(format!(
                "ttlScale must be a finite, non-negative number, got {}",
                self.ttl_scale
            )));
        }
        Ok(())
    }
}

impl ContextPolicy for ContextRules {
    fn should_cache(&self, key: &str) -> bool {
        !self.deny_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }

    fn adjust_ttl(&self, ttl: Option<Duration>, _key: &str) -> Option<Duration> {
        // Saturates instead of panicking when the product leaves Duration's range
        let scaled = ttl.map(|ttl| {
            Duration::try_from_secs_f64(ttl.as_secs_f64() * self.ttl_scale.max(0.0))
                .unwrap_or(Duration::MAX)
        });
        match (scaled, self.max_ttl) {
            (Some(ttl), Some(max)) => Some(ttl.min(max)),
            (None, Some(max)) => Some(max),
            (ttl, None) => ttl,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_policy_behaviour() {
        assert!(WritePolicy::WriteThrough.writes_durable_now());
        assert!(!WritePolicy::WriteThrough.defers_durable());

        assert!(WritePolicy::WriteBack.defers_durable());
        assert!(!WritePolicy::WriteBack.writes_durable_now());

        assert!(!WritePolicy::WriteAround.writes_durable_now());
        assert!(!WritePolicy::WriteAround.defers_durable());
        assert!(!WritePolicy::WriteAround.promotes_to_durable());
        assert!(WritePolicy::WriteBack.promotes_to_durable());
    }

    #[test]
    fn test_write_policy_parse_and_display() {
        for policy in [
            WritePolicy::WriteThrough,
            WritePolicy::WriteBack,
            WritePolicy::WriteAround,
        ] {
            let parsed: WritePolicy = policy.to_string().parse().unwrap();
            assert_eq!(parsed, policy);
        }
        assert!("write-sideways".parse::<WritePolicy>().is_err());
        assert_eq!(WritePolicy::default(), WritePolicy::WriteThrough);
    }

    #[test]
    fn test_write_policy_serde() {
        let yaml = serde_yaml::to_string(&WritePolicy::WriteBack).unwrap();
        assert_eq!(yaml.trim(), "write-back");
    }

    #[test]
    fn test_context_rules_deny_prefix() {
        let rules = ContextRules {
            deny_prefixes: vec!["secret:".to_string()],
            ..Default::default()
        };
        assert!(!rules.should_cache("secret:token"));
        assert!(rules.should_cache("public:page"));
    }

    #[test]
    fn test_context_rules_ttl_scaling() {
        let rules = ContextRules {
            ttl_scale: 0.5,
            max_ttl: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        assert_eq!(
            rules.adjust_ttl(Some(Duration::from_secs(40)), "k"),
            Some(Duration::from_secs(20))
        );
        assert_eq!(
            rules.adjust_ttl(Some(Duration::from_secs(100)), "k"),
            Some(Duration::from_secs(30))
        );
        assert_eq!(rules.adjust_ttl(None, "k"), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_context_rules_huge_scale_saturates() {
        let rules = ContextRules {
            ttl_scale: 1e30,
            ..Default::default()
        };
        assert_eq!(
            rules.adjust_ttl(Some(Duration::from_secs(60)), "k"),
            Some(Duration::MAX)
        );

        let capped = ContextRules {
            ttl_scale: f64::INFINITY,
            max_ttl: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        assert_eq!(
            capped.adjust_ttl(Some(Duration::from_secs(60)), "k"),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_context_rules_validate_scale() {
        assert!(ContextRules::default().validate().is_ok());
        for scale in [f64::INFINITY, f64::NAN, -1.0] {
            let rules = ContextRules {
                ttl_scale: scale,
                ..Default::default()
            };
            assert!(rules.validate().is_err(), "scale {} accepted", scale);
        }
    }

    #[test]
    fn test_context_rules_default_is_identity() {
        let rules = ContextRules::default();
        assert!(rules.should_cache("anything"));
        assert_eq!(rules.adjust_ttl(None, "k"), None);
        assert_eq!(
            rules.adjust_ttl(Some(Duration::from_secs(5)), "k"),
            Some(Duration::from_secs(5))
        );
    }
}
