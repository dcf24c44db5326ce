//! The `beubo-grpc` binary: runs the plugin relay.
//!
//! `serve` binds the streaming endpoint and relays until Ctrl+C. A bind
//! failure exits the process with status 1; every other error only affects
//! the connection it happened on.

mod cli;
mod config;

use crate::cli::{Cli, Commands};
use beubo_grpc_types::config::RelayConfig;
use beubo_grpc_types::plugin::register;
use beubo_grpc_wire::{ChannelRouter, LoggingHandler, RelayServer};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    let mut config = config::load_config(cli.config.as_deref());

    match cli.command.unwrap_or(Commands::Serve { listen: None }) {
        Commands::Serve { listen } => {
            if let Some(addr) = listen {
                config.listen_addr = addr;
            }
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("Error: failed to start async runtime: {e}");
                    std::process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve(config)) {
                error!(error = %e, "Relay failed");
                std::process::exit(1);
            }
        }
        Commands::Info => match serde_json::to_string_pretty(&register(&config.plugin)) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
    }
}

async fn serve(config: RelayConfig) -> Result<(), beubo_grpc_wire::WireError> {
    info!(
        name = %config.plugin.name,
        identifier = %config.plugin.identifier,
        "Starting relay"
    );
    let router = Arc::new(ChannelRouter::new(config.queue.clone()));
    let (server, accept_task) =
        RelayServer::start(config, router, Arc::new(LoggingHandler)).await?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupted, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
    accept_task.abort();

    let status = server.status();
    info!(
        sessions_total = status.sessions_total,
        active = status.active_sessions.len(),
        subscribers = status.subscribers,
        "Relay stopped"
    );
    Ok(())
}
