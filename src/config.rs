// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fabric node configuration.
//!
//! Supports both programmatic and TOML-file-based configuration, matching
//! the loading convention used across this lineage's services: a
//! `#[serde(default = "fn")]` field for every optional setting, and a
//! `validate()` pass that catches cross-field mistakes a successful parse
//! wouldn't.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node_id::NodeId;
use crate::scoring::ScoringWeights;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration for one fabric node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Node name (for logging/identification only).
    #[serde(default = "default_node_name")]
    pub name: String,

    /// This node's own 128-bit identifier.
    pub self_node_id: NodeId,

    /// Overlay port the gossip transport listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Known peers to attempt a gossip `JOIN` against at startup, as hex
    /// node ids. Empty means "wait to be contacted".
    #[serde(default)]
    pub bootstrap_peers: Vec<NodeId>,

    /// Scoring weights applied to every resolve.
    #[serde(default)]
    pub weights: ScoringWeights,

    /// Top-K candidates the forwarding engine considers per frame.
    #[serde(default = "default_max_multipath")]
    pub max_multipath: usize,

    /// Routing-table TTL garbage collection period.
    #[serde(default = "default_gc_interval_secs")]
    pub gc_interval_secs: u64,

    /// Gossip shuffle timer period.
    #[serde(default = "default_shuffle_interval_secs")]
    pub shuffle_interval_secs: u64,

    /// Gossip capability-advertisement timer period.
    #[serde(default = "default_advertise_interval_secs")]
    pub advertise_interval_secs: u64,

    /// How often the driving tick fires (drives both GC and gossip
    /// timers; the timers themselves decide whether they're due).
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Log level passed to `tracing_subscriber::EnvFilter`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_node_name() -> String {
    "strandroute-node".to_string()
}

fn default_listen_port() -> u16 {
    7900
}

fn default_max_multipath() -> usize {
    crate::forwarding::DEFAULT_MAX_MULTIPATH
}

fn default_gc_interval_secs() -> u64 {
    5
}

fn default_shuffle_interval_secs() -> u64 {
    crate::gossip::DEFAULT_SHUFFLE_INTERVAL_NS / 1_000_000_000
}

fn default_advertise_interval_secs() -> u64 {
    crate::gossip::DEFAULT_ADVERTISE_INTERVAL_NS / 1_000_000_000
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            self_node_id: NodeId::ZERO,
            listen_port: default_listen_port(),
            bootstrap_peers: Vec::new(),
            weights: ScoringWeights::default(),
            max_multipath: default_max_multipath(),
            gc_interval_secs: default_gc_interval_secs(),
            shuffle_interval_secs: default_shuffle_interval_secs(),
            advertise_interval_secs: default_advertise_interval_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            log_level: default_log_level(),
        }
    }
}

impl FabricConfig {
    /// Load configuration from a TOML file, validating it before return.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a minimal config for the given node identity.
    pub fn for_node(self_node_id: NodeId) -> Self {
        Self {
            self_node_id,
            ..Default::default()
        }
    }

    /// Override scoring weights (builder style).
    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Override the multipath top-K (builder style).
    pub fn with_max_multipath(mut self, max_multipath: usize) -> Self {
        self.max_multipath = max_multipath;
        self
    }

    /// Add a bootstrap peer (builder style).
    pub fn with_bootstrap_peer(mut self, peer: NodeId) -> Self {
        self.bootstrap_peers.push(peer);
        self
    }

    /// Validate cross-field invariants a successful parse wouldn't catch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.self_node_id.is_zero() {
            return Err(ConfigError::Invalid(
                "self_node_id must not be the zero sentinel".into(),
            ));
        }

        if self.max_multipath == 0 || self.max_multipath > crate::forwarding::MAX_MULTIPATH_CAP {
            return Err(ConfigError::Invalid(format!(
                "max_multipath must be within [1, {}]",
                crate::forwarding::MAX_MULTIPATH_CAP
            )));
        }

        let w = &self.weights;
        for (name, value) in [
            ("capability", w.capability),
            ("latency", w.latency),
            ("cost", w.cost),
            ("context_window", w.context_window),
            ("trust", w.trust),
        ] {
            if value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "scoring weight '{name}' must be nonnegative, got {value}"
                )));
            }
        }

        if self.bootstrap_peers.contains(&self.self_node_id) {
            return Err(ConfigError::Invalid(
                "bootstrap_peers must not include self_node_id".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: u8) -> NodeId {
        NodeId::new([n; 16])
    }

    #[test]
    fn default_config_with_a_real_node_id_validates() {
        let config = FabricConfig::for_node(node(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_self_node_id_is_rejected() {
        let config = FabricConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn multipath_out_of_range_is_rejected() {
        let config = FabricConfig::for_node(node(1)).with_max_multipath(0);
        assert!(config.validate().is_err());
        let config = FabricConfig::for_node(node(1)).with_max_multipath(9);
        assert!(config.validate().is_err());
        let config = FabricConfig::for_node(node(1)).with_max_multipath(8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut config = FabricConfig::for_node(node(1));
        config.weights.capability = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn self_in_bootstrap_peers_is_rejected() {
        let config = FabricConfig::for_node(node(1)).with_bootstrap_peer(node(1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = FabricConfig::for_node(node(7))
            .with_max_multipath(5)
            .with_bootstrap_peer(node(8));
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: FabricConfig = toml::from_str(&toml_str).expect("parse");
        assert_eq!(parsed.self_node_id, config.self_node_id);
        assert_eq!(parsed.max_multipath, 5);
        assert_eq!(parsed.bootstrap_peers, vec![node(8)]);
    }

    #[test]
    fn loads_from_a_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fabric.toml");
        let config = FabricConfig::for_node(node(3));
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = FabricConfig::from_file(&path).unwrap();
        assert_eq!(loaded.self_node_id, config.self_node_id);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = FabricConfig::from_file("/nonexistent/fabric.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
