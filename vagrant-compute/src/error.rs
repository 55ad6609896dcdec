//! Error types for the Vagrant compute provider.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reconciling or driving Vagrant machines.
#[derive(Error, Debug)]
pub enum ComputeError {
    /// A declared box has no Vagrantfile in its box directory.
    #[error("Box configuration missing: {}", path.display())]
    MissingBoxConfig { path: PathBuf },

    /// A machine config references a hardware profile the catalog does not know.
    #[error("Hardware profile not found: {0}")]
    HardwareNotFound(String),

    /// A persisted machine config could not be parsed.
    #[error("Invalid machine config {}: {reason}", path.display())]
    InvalidMachineConfig { path: PathBuf, reason: String },

    /// The external tool exited unsuccessfully.
    #[error("Command `{command}` failed:\n{output}")]
    ProcessFailed { command: String, output: String },

    /// Image was not found in the catalog.
    #[error("Image not found: {0}")]
    ImageNotFound(String),

    /// Node was not found in the registry or on disk.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Caller supplied an unusable argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Filesystem access failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ComputeError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Operator-side misconfiguration, as opposed to a runtime failure.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingBoxConfig { .. } | Self::HardwareNotFound(_)
        )
    }
}

/// Result type alias for compute operations.
pub type Result<T> = std::result::Result<T, ComputeError>;
