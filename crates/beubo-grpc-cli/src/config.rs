//! Configuration loading from `~/.beubo/grpc.toml` with defaults.

use beubo_grpc_types::config::RelayConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default config location.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".beubo")
        .join("grpc.toml")
}

/// Load relay configuration from a TOML file, with defaults.
///
/// A missing, unreadable, or invalid file is logged and the defaults are used.
pub fn load_config(path: Option<&Path>) -> RelayConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return RelayConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(contents) => match toml::from_str::<RelayConfig>(&contents) {
            Ok(config) => {
                info!(path = %config_path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to parse config, using defaults"
                );
                RelayConfig::default()
            }
        },
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            RelayConfig::default()
        }
    }
}
