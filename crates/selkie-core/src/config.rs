//! Configuration for a Selkie node
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Node configuration
///
/// Only the options the workload manager itself consumes live here. The
/// process manager implementations and the bus carry their own
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identifier (auto-generated if not specified)
    #[serde(default)]
    pub node_id: Option<String>,

    /// Disable sandboxed process isolation and spawn agents directly.
    /// A warning is logged whenever this is set.
    #[serde(default)]
    pub no_sandbox: bool,

    /// Handshake timeout for a warmed agent (milliseconds)
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Timeout for agent client RPCs (milliseconds)
    #[serde(default = "default_agent_rpc_timeout_ms")]
    pub agent_rpc_timeout_ms: u64,

    /// Maximum number of agent processes in the pool
    #[serde(default = "default_pool_agents_max")]
    pub pool_agents_max: usize,
}

fn default_handshake_timeout_ms() -> u64 {
    HANDSHAKE_TIMEOUT_MS_DEFAULT
}

fn default_agent_rpc_timeout_ms() -> u64 {
    AGENT_RPC_TIMEOUT_MS_DEFAULT
}

fn default_pool_agents_max() -> usize {
    POOL_AGENTS_COUNT_MAX
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            no_sandbox: false,
            handshake_timeout_ms: default_handshake_timeout_ms(),
            agent_rpc_timeout_ms: default_agent_rpc_timeout_ms(),
            pool_agents_max: default_pool_agents_max(),
        }
    }
}

impl NodeConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.handshake_timeout_ms == 0 {
            return Err(Error::InvalidConfiguration {
                field: "handshake_timeout_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.handshake_timeout_ms > HANDSHAKE_TIMEOUT_MS_MAX {
            return Err(Error::InvalidConfiguration {
                field: "handshake_timeout_ms".into(),
                reason: format!(
                    "{} exceeds limit {}",
                    self.handshake_timeout_ms, HANDSHAKE_TIMEOUT_MS_MAX
                ),
            });
        }

        if self.agent_rpc_timeout_ms == 0 || self.agent_rpc_timeout_ms > AGENT_RPC_TIMEOUT_MS_MAX {
            return Err(Error::InvalidConfiguration {
                field: "agent_rpc_timeout_ms".into(),
                reason: format!("must be in 1..={}", AGENT_RPC_TIMEOUT_MS_MAX),
            });
        }

        if self.pool_agents_max == 0 || self.pool_agents_max > POOL_AGENTS_COUNT_MAX {
            return Err(Error::InvalidConfiguration {
                field: "pool_agents_max".into(),
                reason: format!("must be in 1..={}", POOL_AGENTS_COUNT_MAX),
            });
        }

        Ok(())
    }

    /// Set the handshake timeout in milliseconds
    pub fn with_handshake_timeout_ms(mut self, ms: u64) -> Self {
        self.handshake_timeout_ms = ms;
        self
    }

    /// Set the agent RPC timeout in milliseconds
    pub fn with_agent_rpc_timeout_ms(mut self, ms: u64) -> Self {
        self.agent_rpc_timeout_ms = ms;
        self
    }

    /// Disable sandboxing
    pub fn with_no_sandbox(mut self, no_sandbox: bool) -> Self {
        self.no_sandbox = no_sandbox;
        self
    }

    /// Set the node identifier
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.handshake_timeout_ms, HANDSHAKE_TIMEOUT_MS_DEFAULT);
        assert!(!config.no_sandbox);
    }

    #[test]
    fn test_zero_handshake_timeout_rejected() {
        let config = NodeConfig::default().with_handshake_timeout_ms(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_excessive_handshake_timeout_rejected() {
        let config = NodeConfig::default().with_handshake_timeout_ms(HANDSHAKE_TIMEOUT_MS_MAX + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = NodeConfig::default()
            .with_node_id("node-1")
            .with_no_sandbox(true)
            .with_agent_rpc_timeout_ms(250);

        assert_eq!(config.node_id.as_deref(), Some("node-1"));
        assert!(config.no_sandbox);
        assert_eq!(config.agent_rpc_timeout_ms, 250);
    }
}
