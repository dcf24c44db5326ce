//! Plugin discovery metadata.
//!
//! Beubo catalogs plugins by a `name` / `identifier` pair. The pair is fixed
//! for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default human-readable plugin name.
pub const DEFAULT_PLUGIN_NAME: &str = "Beubo gRPC";

/// Default plugin identifier.
pub const DEFAULT_PLUGIN_IDENTIFIER: &str = "beubo_grpc";

/// Name and identifier advertised to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginInfo {
    /// Human-readable plugin name.
    pub name: String,
    /// Identifier that differentiates this plugin from other plugins.
    pub identifier: String,
}

impl Default for PluginInfo {
    fn default() -> Self {
        Self {
            name: DEFAULT_PLUGIN_NAME.to_string(),
            identifier: DEFAULT_PLUGIN_IDENTIFIER.to_string(),
        }
    }
}

/// Discovery call used by the host to catalog this plugin: the `name` and
/// `identifier` keys of the configured [`PluginInfo`].
pub fn register(info: &PluginInfo) -> HashMap<String, String> {
    HashMap::from([
        ("name".to_string(), info.name.clone()),
        ("identifier".to_string(), info.identifier.clone()),
    ])
}
