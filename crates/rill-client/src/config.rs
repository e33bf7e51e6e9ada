//! Client configuration.

use std::path::Path;
use std::time::Duration;

use rill_topology::MonitorConfig;
use rill_types::{NodeId, TopologyNode};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Configuration for [`crate::RillClient`], loadable from a TOML file.
///
/// Every field has a default, so a config file only needs to name the
/// seeds it wants to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Seed node endpoints, `host:port`. Discovery replaces these with the
    /// cluster's own membership once a seed answers.
    pub seeds: Vec<String>,
    /// Whether to run topology discovery. When off, the client talks only
    /// to the seed nodes.
    pub discover: bool,
    /// Interval between health probe rounds, in milliseconds.
    pub probe_interval_ms: u64,
    /// Per-probe timeout, in milliseconds.
    pub probe_timeout_ms: u64,
    /// Maximum concurrent probes per round.
    pub probe_concurrency: usize,
    /// Interval between topology discovery rounds, in milliseconds.
    pub discovery_interval_ms: u64,
    /// Per-attempt request timeout, in milliseconds.
    pub request_timeout_ms: u64,
    /// Retries after the first attempt, for transient failures only.
    pub retries: usize,
    /// Ring replication factor assumed when the topology document does not
    /// advertise one.
    pub replication: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            discover: true,
            probe_interval_ms: 1_000,
            probe_timeout_ms: 500,
            probe_concurrency: 8,
            discovery_interval_ms: 30_000,
            request_timeout_ms: 10_000,
            retries: 3,
            replication: 2,
        }
    }
}

impl ClientConfig {
    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ClientError::Config(format!("read config: {e}")))?;
        toml::from_str(&text).map_err(|e| ClientError::Config(format!("parse config: {e}")))
    }

    /// Per-attempt request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Derive the health monitor configuration.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            probe_interval: Duration::from_millis(self.probe_interval_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            probe_concurrency: self.probe_concurrency,
            discovery_interval: Duration::from_millis(self.discovery_interval_ms),
            discovery_timeout: self.request_timeout(),
            discover: self.discover,
            replication: self.replication,
        }
    }

    /// Parse the seed endpoints into provisional topology entries.
    ///
    /// A seed is known only by address until the first discovery round, so
    /// its endpoint string doubles as its provisional node ID.
    pub fn seed_nodes(&self) -> Result<Vec<TopologyNode>, ClientError> {
        self.seeds.iter().map(|s| parse_seed(s)).collect()
    }
}

fn parse_seed(seed: &str) -> Result<TopologyNode, ClientError> {
    let (address, port) = seed
        .rsplit_once(':')
        .ok_or_else(|| ClientError::Config(format!("seed '{seed}' is not host:port")))?;
    if address.is_empty() {
        return Err(ClientError::Config(format!("seed '{seed}' has no host")));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| ClientError::Config(format!("seed '{seed}' has an invalid port")))?;
    Ok(TopologyNode {
        id: NodeId::new(seed),
        address: address.to_string(),
        port,
        api_port: port,
        weight: 0,
        n: 0,
    })
}
