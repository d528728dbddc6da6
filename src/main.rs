//! Tiercache demo driver
//!
//! Runs a synthetic read workload against in-memory tiers with the
//! predictive engine attached, then prints the learned predictions and the
//! cache statistics.
//!
//! ```text
//! ┌──────────────┐  get/set   ┌──────────────┐  get events  ┌──────────────┐
//! │   Workload   │───────────▶│ CacheManager │─────────────▶│  Predictive  │
//! │   (rounds)   │            │              │◀─────────────│    Cache     │
//! └──────────────┘            └──────────────┘   preCache   └──────────────┘
//! ```

use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use serde_json::json;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tiercache::events::log_events;
use tiercache::{
    source_fn, CacheConfig, CacheManager, Error, GetOptions, PredictiveCache, Result, WritePolicy,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tiercache - tiered cache with predictive pre-caching
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "TIERCACHE_CONFIG")]
    config: Option<String>,

    /// Write policy override (write-through, write-back, write-around)
    #[arg(long, env = "TIERCACHE_WRITE_POLICY")]
    write_policy: Option<WritePolicy>,

    /// Comma-separated keys read in order each round
    #[arg(long, env = "TIERCACHE_KEYS", default_value = "a,b,c", value_delimiter = ',')]
    keys: Vec<String>,

    /// Number of passes over the key list
    #[arg(long, env = "TIERCACHE_ROUNDS", default_value = "5")]
    rounds: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Print statistics in Prometheus text format instead of JSON
    #[arg(long)]
    prometheus: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let mut config = match &args.config {
        Some(path) => CacheConfig::from_file(path)?,
        None => CacheConfig::default(),
    };
    if let Some(policy) = args.write_policy {
        config.write_policy = policy;
    }
    config.validate()?;

    if args.keys.is_empty() {
        return Err(Error::Config("--keys must name at least one key".to_string()));
    }

    info!("Starting tiercache workload");
    info!("  Write policy: {}", config.write_policy);
    info!("  Keys: {}", args.keys.join(","));
    info!("  Rounds: {}", args.rounds);

    let predictive_config = config.predictive.clone();
    let manager = CacheManager::in_memory(config)?;
    log_events(manager.events());

    let engine = PredictiveCache::new(Arc::clone(&manager), predictive_config)?;
    engine.register_source(source_fn(|key: String| async move {
        Ok(Some(Bytes::from(format!("origin:{}", key))))
    }));

    let mut pre_cached = 0;
    for round in 0..args.rounds {
        for key in &args.keys {
            let origin = key.clone();
            manager
                .get_or_fetch(key, &GetOptions::new(), || async move {
                    Ok::<_, Error>(Bytes::from(format!("origin:{}", origin)))
                })
                .await;
        }
        let count = engine.trigger_pre_cache().await;
        pre_cached += count;
        info!(round, pre_cached = count, "Round complete");
    }

    manager.flush().await;

    let stats = manager.stats();
    if args.prometheus {
        print!("{}", stats.to_prometheus()?);
    } else {
        let report = json!({
            "predictions": engine.get_predictions(),
            "preCached": pre_cached,
            "cache": stats,
            "predictive": engine.stats(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    engine.dispose();
    manager.shutdown();

    info!("Workload complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr so stdout stays machine-readable
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
