//! Contracts the reconciler requires from the external Vagrant tooling.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BoxRef, LoginCredentials};

/// Source of installed boxes.
#[async_trait]
pub trait BoxCatalog: Send + Sync {
    /// Every installed `(name, version, provider)` triple.
    async fn list_boxes(&self) -> Result<Vec<BoxRef>>;

    /// The current box for `name`, if any is installed.
    async fn get_box(&self, name: &str) -> Result<Option<BoxRef>>;
}

/// Drops superseded box versions from a listing.
pub trait StaleBoxFilter: Send + Sync {
    fn retain_current(&self, boxes: Vec<BoxRef>) -> Vec<BoxRef>;
}

/// Process control for the machines of one Vagrant project.
///
/// Every call blocks on an external process and runs to completion; callers
/// that are latency sensitive should spawn it onto its own task.
#[async_trait]
pub trait MachineControl: Send + Sync {
    /// Boot the machine and return the captured console transcript.
    async fn up(&self, machine: &str) -> Result<String>;

    /// Graceful shutdown.
    async fn halt(&self, machine: &str) -> Result<()>;

    /// Power off without waiting for the guest.
    async fn halt_forced(&self, machine: &str) -> Result<()>;

    /// Remove the machine and its disks.
    async fn destroy(&self, machine: &str) -> Result<()>;

    /// SSH connection details for a booted machine.
    async fn ssh_config(&self, machine: &str) -> Result<LoginCredentials>;

    /// Whether the project is initialised on disk.
    async fn exists(&self) -> bool;
}

/// Hands out a `MachineControl` bound to a project directory.
pub trait MachineControlFactory: Send + Sync {
    fn for_project(&self, project: &Path) -> Arc<dyn MachineControl>;
}
