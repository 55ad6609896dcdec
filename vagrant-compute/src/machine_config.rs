//! Persisted per-machine configuration.
//!
//! Stored at `<home>/<group>/machine-configs/<machine>.cfg` as `key=value`
//! lines. The group's Vagrantfile reads these files to define its machines,
//! and the scanner reads them to rebuild nodes after a restart.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use crate::error::{ComputeError, Result};
use crate::types::Hardware;

/// Directory name under each group holding machine configs.
pub const MACHINE_CONFIG_DIR: &str = "machine-configs";

/// Extension of machine config files.
pub const MACHINE_CONFIG_EXT: &str = "cfg";

/// Path of the config file for `machine` in `group`.
pub fn machine_config_path(home: &Path, group: &str, machine: &str) -> PathBuf {
    home.join(group)
        .join(MACHINE_CONFIG_DIR)
        .join(format!("{}.{}", machine, MACHINE_CONFIG_EXT))
}

/// Typed contents of a machine config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// Box name (required)
    pub box_name: String,
    /// Box version, when pinned
    pub box_version: Option<String>,
    /// Hypervisor provider, when pinned
    pub provider: Option<String>,
    /// Named profile or `automatic` (required)
    pub hardware_id: String,
    /// Required for automatic hardware
    pub cpus: Option<u32>,
    /// MiB, required for automatic hardware
    pub memory_mib: Option<u64>,
    pub networks: Vec<String>,
    pub hostname: Option<String>,
}

impl MachineConfig {
    /// Parse the `key=value` format, failing on missing required keys.
    pub fn parse(path: &Path, contents: &str) -> Result<Self> {
        let invalid = |reason: String| ComputeError::InvalidMachineConfig {
            path: path.to_path_buf(),
            reason,
        };

        let mut box_name = None;
        let mut box_version = None;
        let mut provider = None;
        let mut hardware_id = None;
        let mut cpus = None;
        let mut memory_mib = None;
        let mut networks = Vec::new();
        let mut hostname = None;

        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| invalid(format!("line {}: expected key=value", lineno + 1)))?;
            let value = value.trim().to_string();
            match key.trim() {
                "box" => box_name = Some(value),
                "boxVersion" => box_version = Some(value),
                "provider" => provider = Some(value),
                "hardwareId" => hardware_id = Some(value),
                "cpus" => {
                    cpus = Some(
                        value
                            .parse()
                            .map_err(|_| invalid(format!("cpus is not a number: {}", value)))?,
                    )
                }
                "memory" => {
                    memory_mib = Some(
                        value
                            .parse()
                            .map_err(|_| invalid(format!("memory is not a number: {}", value)))?,
                    )
                }
                "networks" => {
                    networks = value
                        .split(',')
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(String::from)
                        .collect()
                }
                "hostname" => hostname = Some(value),
                // Keys written by newer versions are ignored
                _ => {}
            }
        }

        let box_name = box_name
            .filter(|b| !b.is_empty())
            .ok_or_else(|| invalid("missing required key `box`".to_string()))?;
        let hardware_id = hardware_id
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing required key `hardwareId`".to_string()))?;

        if Hardware::is_automatic_id(&hardware_id) {
            if cpus.is_none() {
                return Err(invalid("automatic hardware requires `cpus`".to_string()));
            }
            if memory_mib.is_none() {
                return Err(invalid("automatic hardware requires `memory`".to_string()));
            }
        }

        Ok(Self {
            box_name,
            box_version,
            provider,
            hardware_id,
            cpus,
            memory_mib,
            networks,
            hostname,
        })
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ComputeError::io(path, e))?;
        Self::parse(path, &contents)
    }

    /// Serialise back to the on-disk format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "box={}", self.box_name);
        if let Some(version) = &self.box_version {
            let _ = writeln!(out, "boxVersion={}", version);
        }
        if let Some(provider) = &self.provider {
            let _ = writeln!(out, "provider={}", provider);
        }
        let _ = writeln!(out, "hardwareId={}", self.hardware_id);
        if let Some(cpus) = self.cpus {
            let _ = writeln!(out, "cpus={}", cpus);
        }
        if let Some(memory) = self.memory_mib {
            let _ = writeln!(out, "memory={}", memory);
        }
        if !self.networks.is_empty() {
            let _ = writeln!(out, "networks={}", self.networks.join(","));
        }
        if let Some(hostname) = &self.hostname {
            let _ = writeln!(out, "hostname={}", hostname);
        }
        out
    }

    /// Write to a new file at `path`, creating the parent directory.
    ///
    /// An existing file is never overwritten.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ComputeError::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => ComputeError::InvalidArgument(format!(
                    "machine config already exists: {}",
                    path.display()
                )),
                _ => ComputeError::io(path, e),
            })?;
        file.write_all(self.render().as_bytes())
            .map_err(|e| ComputeError::io(path, e))
    }
}
