//! Configuration management for the node binary.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use vagrant_compute::ProviderConfig;
use vagrant_compute_common::LogFormat;

use crate::cli::Args;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vagrant-compute/node.yaml";

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Machine control backend
    pub backend: ControlBackend,
    /// Provider home, vagrant binary and registry timing
    pub provider: ProviderConfig,
    /// `watch` loop settings
    pub watcher: WatcherConfig,
    /// Log output
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: ControlBackend::default(),
            provider: ProviderConfig::from_env(),
            watcher: WatcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with CLI overrides applied.
    pub fn default_with_cli(args: &Args) -> Self {
        Self::default().with_cli_overrides(args)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref home) = args.home {
            self.provider.home = home.clone();
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if args.dev {
            self.backend = ControlBackend::Mock;
        }

        self
    }

    /// Reject settings the registry or watcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.provider.registry.vacuum_interval_secs == 0 {
            bail!("registry.vacuum_interval_secs must be greater than zero");
        }
        if self.watcher.poll_interval_secs == 0 {
            bail!("watcher.poll_interval_secs must be greater than zero");
        }
        if self.provider.vagrant_binary.trim().is_empty() {
            bail!("provider.vagrant_binary must not be empty");
        }
        Ok(())
    }
}

/// Machine control backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlBackend {
    /// The `vagrant` command-line tool
    #[default]
    Vagrant,
    /// Simulated machines for development
    Mock,
}

/// `watch` loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Seconds between polls
    pub poll_interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
