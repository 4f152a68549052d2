//! Configuration management for scoregraph tools.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (SCOREGRAPH__ prefix, `__` as the section separator)
//! 2. Config file (scoregraph.toml, or another prefix given on the command line)
//! 3. Defaults

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, ScoregraphError};

/// Top-level settings shared by the import and query tools.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub neo4j: Neo4jSettings,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub staging: StagingSettings,

    #[serde(default)]
    pub rebuild: RebuildSettings,
}

impl Settings {
    /// Load settings from `<file_prefix>.toml` (optional) layered under the environment.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("SCOREGRAPH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ScoregraphError::Config(e.to_string()))?;

        cfg.try_deserialize::<Settings>()
            .map_err(|e| ScoregraphError::Config(e.to_string()))
    }
}

/// Connection settings for the Neo4j server.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jSettings {
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

/// Bounded exponential backoff used for every call to the graph store.
///
/// Only transient connectivity failures are retried. `max_attempts` counts the
/// first try, so the default of 3 means one call plus two retries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = millis.min(self.max_backoff_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Local write-buffer and commit batching.
#[derive(Debug, Clone, Deserialize)]
pub struct StagingSettings {
    /// Pending writes allowed before the staging store flushes on its own.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    #[serde(default = "default_batch_size")]
    pub vertex_batch_size: usize,

    #[serde(default = "default_batch_size")]
    pub edge_batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebuildSettings {
    /// Upper bound on children fetched per container during leaf fill.
    #[serde(default = "default_leaf_fetch_limit")]
    pub leaf_fetch_limit: usize,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "scoregraph-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_flush_threshold() -> usize {
    1000
}

fn default_batch_size() -> usize {
    100
}

fn default_leaf_fetch_limit() -> usize {
    500
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for StagingSettings {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
            vertex_batch_size: default_batch_size(),
            edge_batch_size: default_batch_size(),
        }
    }
}

impl Default for RebuildSettings {
    fn default() -> Self {
        Self {
            leaf_fetch_limit: default_leaf_fetch_limit(),
        }
    }
}
