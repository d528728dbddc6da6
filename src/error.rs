//! Error types for the tiered cache

use thiserror::Error;

use crate::cache::TierKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the tiered cache
#[derive(Error, Debug)]
pub enum Error {
    /// A tier operation failed
    #[error("{tier} tier {operation} failed: {reason}")]
    Tier {
        tier: TierKind,
        operation: &'static str,
        reason: String,
    },

    /// Caller-supplied fetch function failed
    #[error("Fetch failed for key {key}: {reason}")]
    Fetch { key: String, reason: String },

    /// Speculative pre-cache of a predicted key failed
    #[error("Pre-cache failed for key {key}: {reason}")]
    Prefetch { key: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Duration parse error
    #[error("Failed to parse duration: {0}")]
    DurationParse(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Metrics exposition error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a tier failure
    pub fn tier(tier: TierKind, operation: &'static str, reason: impl Into<String>) -> Self {
        Error::Tier {
            tier,
            operation,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_error_display() {
        let err = Error::tier(TierKind::Durable, "set", "disk full");
        assert_eq!(err.to_string(), "durable tier set failed: disk full");
    }

    #[test]
    fn test_fetch_error_display() {
        let err = Error::Fetch {
            key: "user:1".to_string(),
            reason: "origin unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Fetch failed for key user:1: origin unavailable"
        );
    }
}
