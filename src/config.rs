//! Configuration for a catalog node.
//!
//! Configuration is passed to [`CatalogNode::new()`](crate::node::CatalogNode)
//! and can be constructed programmatically or deserialized from JSON/YAML.
//!
//! # Quick Start
//!
//! ```rust
//! use catalog_mesh::config::NodeConfig;
//!
//! let config = NodeConfig {
//!     node_id: "store-eu-1".into(),
//!     ..Default::default()
//! };
//! ```
//!
//! # Node identity and queue naming
//!
//! The node id is explicit configuration, never derived from hostname or
//! process identity. Every broadcast exchange fans out to one exclusive
//! queue per node, named `{exchange}.{node_id}`, so each node receives
//! every event exactly once per node regardless of fleet size.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The top-level config object passed to `CatalogNode::new()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// The identity of the local node. Used to derive this node's exclusive
    /// queue names and to tag published events with their origin.
    pub node_id: String,

    /// Consumer-side settings (retry policy, dead-lettering).
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "local.dev.node".to_string(),
            consumer: ConsumerConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Create a minimal config for testing, with fast retry timing.
    pub fn for_testing(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            consumer: ConsumerConfig {
                retry: RetryConfig::testing(),
                ..ConsumerConfig::default()
            },
        }
    }

    /// Validate the configuration.
    ///
    /// Node ids must be non-empty and must not contain the queue-name
    /// separator, otherwise two nodes could alias each other's queues.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.node_id.trim().is_empty() {
            return Err(crate::error::CatalogError::Config(
                "node_id must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// The exclusive queue name this node binds on a given exchange.
    pub fn queue_name(&self, exchange: &str) -> String {
        format!("{exchange}.{}", self.node_id)
    }
}

/// Consumer-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Retry policy for retryable apply failures (store unavailable).
    #[serde(default)]
    pub retry: RetryConfig,

    /// Whether events that exhaust their retries are published to the
    /// dead-letter exchange instead of being dropped.
    #[serde(default = "default_true")]
    pub dead_letter_enabled: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            dead_letter_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Retry policy with exponential backoff.
///
/// Used by consumers when applying an event fails with a retryable error.
/// A failed apply is never silently discarded: it is retried up to
/// `max_attempts` times and then dead-lettered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of apply attempts (including the first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Ceiling for the backoff delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (2.0 = double the delay each retry).
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Fast-fail policy for tests.
    pub fn testing() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 10,
            backoff_factor: 2.0,
        }
    }

    /// Calculate the backoff delay before a given retry (1-indexed).
    ///
    /// Attempt 1 gets `initial_delay_ms`, each subsequent attempt is
    /// multiplied by `backoff_factor`, capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let multiplier = self.backoff_factor.powi(attempt as i32 - 1);
        let delay_ms = (self.initial_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}
