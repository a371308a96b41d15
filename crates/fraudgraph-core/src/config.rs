//! Configuration for the relationship resolver.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (FRAUDGRAPH prefix, `__` separator)
//! 2. Config file (fraudgraph.toml, `[resolver]` section)
//! 3. Defaults

use serde::Deserialize;

use crate::error::CoreError;

/// Resolver limits and runtime knobs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ResolverConfig {
    /// Hops from the seed used when a request does not specify one.
    #[serde(default = "default_max_depth")]
    pub default_max_depth: usize,

    /// Node budget used when a request does not specify one.
    #[serde(default = "default_max_nodes")]
    pub default_max_nodes: usize,

    /// Upper bound applied to any requested node budget.
    #[serde(default = "default_hard_max_nodes")]
    pub hard_max_nodes: usize,

    /// Per-request deadline in milliseconds. 0 disables the deadline.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Capacity of the store event channel feeding the index.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_max_depth() -> usize {
    3
}

fn default_max_nodes() -> usize {
    500
}

fn default_hard_max_nodes() -> usize {
    10_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_event_buffer() -> usize {
    1024
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_max_depth: default_max_depth(),
            default_max_nodes: default_max_nodes(),
            hard_max_nodes: default_hard_max_nodes(),
            timeout_ms: default_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl ResolverConfig {
    /// Load from `{file_prefix}.toml` (optional) and the environment.
    pub fn load(file_prefix: &str) -> Result<Self, CoreError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("FRAUDGRAPH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        let loaded = match cfg.get::<ResolverConfig>("resolver") {
            Ok(c) => c,
            Err(config::ConfigError::NotFound(_)) => {
                tracing::debug!(file_prefix, "No [resolver] section, using defaults");
                ResolverConfig::default()
            }
            Err(e) => return Err(CoreError::Config(e.to_string())),
        };

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.default_max_depth == 0 {
            return Err(CoreError::Config("default_max_depth must be >= 1".into()));
        }
        if self.default_max_nodes == 0 || self.hard_max_nodes == 0 {
            return Err(CoreError::Config("node budgets must be >= 1".into()));
        }
        if self.default_max_nodes > self.hard_max_nodes {
            return Err(CoreError::Config(
                "default_max_nodes must not exceed hard_max_nodes".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(CoreError::Config("event_buffer must be >= 1".into()));
        }
        Ok(())
    }
}
