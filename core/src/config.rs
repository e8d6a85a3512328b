//! Configuration types for quorumcast

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{QuorumcastError, QuorumcastResult};

/// Well-known bootstrap peer for local runs
pub const DEFAULT_BOOTSTRAP_NODE: &str =
    "/ip4/127.0.0.1/tcp/63785/p2p/12D3KooWD69Wgc2AmdtZytRFr2HMhAppcaXWNgGZzc9A4rcUPFKo";

/// Listen address of the bootstrap process
pub const DEFAULT_BOOTSTRAP_LISTEN_ADDR: &str = "/ip4/127.0.0.1/tcp/63785";

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name for logging
    pub name: String,

    /// Network configuration
    pub network: NetworkConfig,

    /// Simulation configuration
    pub simulation: SimulationConfig,

    /// Logging level, overridden by RUST_LOG
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "quorumcast-node".to_string(),
            network: NetworkConfig::default(),
            simulation: SimulationConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    pub fn from_json(json: &str) -> QuorumcastResult<Self> {
        let config: NodeConfig = serde_json::from_str(json)
            .map_err(|e| QuorumcastError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> QuorumcastResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            QuorumcastError::ConfigError(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> QuorumcastResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject configurations the simulation cannot run with
    pub fn validate(&self) -> QuorumcastResult<()> {
        if self.simulation.roles.is_empty() {
            return Err(QuorumcastError::ConfigError(
                "simulation.roles must name at least one node".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for role in &self.simulation.roles {
            if !seen.insert(role.as_str()) {
                return Err(QuorumcastError::ConfigError(format!(
                    "duplicate node id in simulation.roles: {}",
                    role
                )));
            }
        }

        if self.network.inbound_buffer == 0 {
            return Err(QuorumcastError::ConfigError(
                "network.inbound_buffer must be positive".into(),
            ));
        }

        Ok(())
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Listen address for P2P
    pub listen_addr: String,

    /// Bootstrap nodes, dialled verbatim
    pub bootstrap_nodes: Vec<String>,

    /// Maximum tracked peer connections
    pub max_peers: usize,

    /// Enable mDNS for local discovery
    pub enable_mdns: bool,

    /// Idle connection timeout in seconds
    pub idle_connection_timeout_secs: u64,

    /// Gossipsub heartbeat in milliseconds
    pub heartbeat_interval_ms: u64,

    /// Capacity of the inbound message queue per session
    pub inbound_buffer: usize,

    /// Deliver our own publications to our own subscriptions
    pub emit_self: bool,

    /// Treat publishing with no subscribed peers as success
    pub allow_publish_to_zero_peers: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/0".to_string(),
            bootstrap_nodes: vec![DEFAULT_BOOTSTRAP_NODE.to_string()],
            max_peers: 50,
            enable_mdns: true,
            idle_connection_timeout_secs: 60,
            heartbeat_interval_ms: 1000,
            inbound_buffer: 1000,
            emit_self: true,
            allow_publish_to_zero_peers: true,
        }
    }
}

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Ids of the node agents started by the simulation
    pub roles: Vec<String>,

    /// Every ready agent votes `valid` on each request it sees
    pub auto_vote: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            roles: (1..=5).map(|i| format!("node{}", i)).collect(),
            auto_vote: false,
        }
    }
}
