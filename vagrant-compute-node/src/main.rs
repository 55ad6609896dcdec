//! # vagrant-compute Node
//!
//! Manages Vagrant machines on this host: one-shot lifecycle commands and a
//! long-running watcher that reports node changes.
//!
//! ## Usage
//! ```bash
//! vagrant-compute-node --config /etc/vagrant-compute/node.yaml nodes
//! vagrant-compute-node create web web-1 --image ubuntu/20.04/virtualbox --hardware small
//! vagrant-compute-node watch
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use vagrant_compute::{
    BoxCatalog, LocalBoxCatalog, MachineControlFactory, MockVagrant, NodeRegistry,
    VagrantCliFactory, VagrantComputeService,
};
use vagrant_compute_node::cli::{Args, Command};
use vagrant_compute_node::commands;
use vagrant_compute_node::config::{Config, ControlBackend, DEFAULT_CONFIG_PATH};
use vagrant_compute_node::watcher::NodeWatcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration before logging so the file can pick the log format
    let (config, source) = match &args.config {
        Some(config_path) => (
            Config::load(config_path)?.with_cli_overrides(&args),
            Some(config_path.clone()),
        ),
        None => match Config::load(DEFAULT_CONFIG_PATH) {
            Ok(cfg) => (cfg.with_cli_overrides(&args), Some(DEFAULT_CONFIG_PATH.to_string())),
            Err(_) => (Config::default_with_cli(&args), None),
        },
    };

    vagrant_compute_common::init_logging(&config.logging.level, config.logging.format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting vagrant-compute node"
    );
    match &source {
        Some(path) => info!(config_path = %path, "Configuration loaded"),
        None => info!("No config file found, using CLI arguments and defaults"),
    }
    info!(
        home = %config.provider.home.display(),
        backend = ?config.backend,
        "Node configured"
    );

    let service = Arc::new(build_service(&config));

    if let Command::Watch { interval_secs } = &args.command {
        let poll_interval = interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.watcher.poll_interval());
        let watcher = NodeWatcher::new(service, poll_interval);
        watcher
            .run(
                |change| match serde_json::to_string(change) {
                    Ok(line) => println!("{}", line),
                    Err(e) => error!(error = %e, "Failed to encode node change"),
                },
                async {
                    let _ = tokio::signal::ctrl_c().await;
                },
            )
            .await;
        return Ok(());
    }

    match commands::execute(&service, &args.command).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            Err(e)
        }
    }
}

fn build_service(config: &Config) -> VagrantComputeService {
    let registry = Arc::new(NodeRegistry::new(config.provider.registry));
    let catalog: Arc<dyn BoxCatalog> = Arc::new(LocalBoxCatalog::new(&config.provider.home));
    let controls: Arc<dyn MachineControlFactory> = match config.backend {
        ControlBackend::Vagrant => {
            Arc::new(VagrantCliFactory::new(&config.provider.vagrant_binary))
        }
        ControlBackend::Mock => {
            info!("Development mode: machines are simulated");
            Arc::new(MockVagrant::new())
        }
    };
    VagrantComputeService::from_config(&config.provider, registry, catalog, controls)
}
