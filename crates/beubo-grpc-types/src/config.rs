//! Relay configuration.
//!
//! Every field has a default so a partial (or empty) TOML file is valid.

use crate::plugin::PluginInfo;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Default listen address of the streaming endpoint.
pub const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 50051);

/// What an outbound queue does when it reaches its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Never full; capacity is ignored.
    #[default]
    Unbounded,
    /// Producers wait (or get the message back) until there is room.
    Block,
    /// The oldest queued message is discarded to make room.
    DropOldest,
}

/// Outbound queue settings, shared by the request and response queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of queued messages per channel.
    pub capacity: usize,
    /// Behavior once `capacity` is reached.
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            overflow: OverflowPolicy::Unbounded,
        }
    }
}

/// Restart policy for a session's forwarding tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Restarts allowed per channel per session. 0 disables restarting.
    pub max_restarts: u32,
    /// First backoff delay in milliseconds.
    pub min_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            min_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }
}

impl SupervisorConfig {
    /// Backoff before restart number `attempt` (0-indexed):
    /// `min(min_delay * 2^attempt, max_delay)`.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let base = self
            .min_delay_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        base.min(self.max_delay_ms)
    }
}

/// Top-level relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the streaming endpoint listens on.
    pub listen_addr: SocketAddr,
    /// Discovery metadata.
    pub plugin: PluginInfo,
    /// Outbound queue settings.
    pub queue: QueueConfig,
    /// Forwarding task supervision.
    pub supervisor: SupervisorConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR,
            plugin: PluginInfo::default(),
            queue: QueueConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}
