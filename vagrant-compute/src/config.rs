//! Provider configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::registry::RegistryConfig;
use crate::vagrant::DEFAULT_VAGRANT_BINARY;

/// Environment variable overriding the provider home directory.
pub const HOME_ENV: &str = "VAGRANT_COMPUTE_HOME";

/// Home directory name used when `HOME_ENV` is unset, relative to the user's home.
pub const DEFAULT_HOME_DIR: &str = ".vagrant-compute";

/// Settings for one provider instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Root holding `boxes/` and one directory per group
    pub home: PathBuf,
    /// `vagrant` executable
    pub vagrant_binary: String,
    /// Registry timing
    pub registry: RegistryConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            home: default_home(),
            vagrant_binary: DEFAULT_VAGRANT_BINARY.to_string(),
            registry: RegistryConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Defaults, with the home taken from `VAGRANT_COMPUTE_HOME` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|h| !h.is_empty()) {
            config.home = PathBuf::from(home);
        }
        config
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }
}

/// `~/.vagrant-compute`, or a relative `.vagrant-compute` when no home is known.
pub fn default_home() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_HOME_DIR))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HOME_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::default();
        assert!(config.home.ends_with(DEFAULT_HOME_DIR));
        assert_eq!(config.vagrant_binary, "vagrant");
        assert_eq!(config.registry.grace_period_secs, 300);
        assert_eq!(config.registry.vacuum_interval_secs, 15);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ProviderConfig =
            serde_json::from_str(r#"{"home": "/srv/vagrant", "registry": {"grace_period_secs": 60}}"#)
                .unwrap();
        assert_eq!(config.home, PathBuf::from("/srv/vagrant"));
        assert_eq!(config.registry.grace_period_secs, 60);
        assert_eq!(config.registry.vacuum_interval_secs, 15);
        assert_eq!(config.vagrant_binary, "vagrant");
    }
}
