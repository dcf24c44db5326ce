//! Clap CLI definitions for the relay.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Event relay between Beubo and its plugins.
#[derive(Parser, Debug)]
#[command(name = "beubo-grpc", version, about)]
pub struct Cli {
    /// Path to config file (default: ~/.beubo/grpc.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the relay server until interrupted (default).
    Serve {
        /// Listen address, overriding the config file.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Print the plugin discovery metadata as JSON.
    Info,
}
