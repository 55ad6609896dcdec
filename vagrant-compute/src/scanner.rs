//! Rebuilds nodes for machines created by earlier processes.
//!
//! Walks `<home>/<group>/machine-configs/<machine>.cfg`, resolves each
//! machine's image and hardware, and returns best-effort nodes in the
//! `Unrecognized` state. Probing Vagrant for the real state of every machine
//! is too slow for a bulk scan; targeted operations refine it later.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::error::{ComputeError, Result};
use crate::hardware::HardwareCatalog;
use crate::images::ImageSupplier;
use crate::machine_config::{
    machine_config_path, MachineConfig, MACHINE_CONFIG_DIR, MACHINE_CONFIG_EXT,
};
use crate::types::{Image, MachineState, Node, NodeId};

/// A machine left out of a scan, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMachine {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub nodes: Vec<Node>,
    pub skipped: Vec<SkippedMachine>,
}

/// Per-entry outcome that must not stop the batch.
enum Entry {
    Node(Node),
    Skipped(SkippedMachine),
}

/// Scanner over a provider home directory.
pub struct ExistingMachineScanner {
    home: PathBuf,
    images: Arc<ImageSupplier>,
    hardware: Arc<HardwareCatalog>,
}

impl ExistingMachineScanner {
    pub fn new(
        home: impl Into<PathBuf>,
        images: Arc<ImageSupplier>,
        hardware: Arc<HardwareCatalog>,
    ) -> Self {
        Self {
            home: home.into(),
            images,
            hardware,
        }
    }

    /// Nodes for every usable machine on disk.
    pub async fn scan(&self) -> Result<Vec<Node>> {
        Ok(self.scan_report().await?.nodes)
    }

    /// Like [`scan`](Self::scan), also reporting the machines that were skipped.
    ///
    /// A machine whose image is gone or whose config is unreadable is skipped.
    /// A reference to an unknown named hardware profile fails the whole scan.
    #[instrument(skip(self), fields(home = %self.home.display()))]
    pub async fn scan_report(&self) -> Result<ScanReport> {
        let images = self.images.get().await?;
        let mut report = ScanReport::default();

        for path in self.machine_config_files() {
            match self.build_node(&path, &images)? {
                Entry::Node(node) => report.nodes.push(node),
                Entry::Skipped(skipped) => report.skipped.push(skipped),
            }
        }

        info!(
            nodes = report.nodes.len(),
            skipped = report.skipped.len(),
            "Scanned existing machines"
        );
        Ok(report)
    }

    /// Rebuild a single machine, `None` when it has no usable config.
    ///
    /// Only this machine's config is read, so unrelated broken configs do not
    /// affect the lookup.
    #[instrument(skip(self), fields(home = %self.home.display()))]
    pub async fn scan_machine(&self, group: &str, name: &str) -> Result<Option<Node>> {
        let path = machine_config_path(&self.home, group, name);
        if !path.is_file() {
            return Ok(None);
        }
        let images = self.images.get().await?;
        match self.build_node(&path, &images)? {
            Entry::Node(node) => Ok(Some(node)),
            Entry::Skipped(skipped) => {
                debug!(path = %skipped.path.display(), reason = %skipped.reason, "Machine not usable");
                Ok(None)
            }
        }
    }

    /// Config files at exactly `<home>/<group>/machine-configs/<machine>.cfg`.
    fn machine_config_files(&self) -> Vec<PathBuf> {
        if !self.home.is_dir() {
            return Vec::new();
        }

        WalkDir::new(&self.home)
            .min_depth(3)
            .max_depth(3)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Unreadable entry under machine home");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension().is_some_and(|ext| ext == MACHINE_CONFIG_EXT)
                    && path
                        .parent()
                        .and_then(Path::file_name)
                        .is_some_and(|dir| dir == MACHINE_CONFIG_DIR)
            })
            .collect()
    }

    fn build_node(&self, path: &Path, images: &[Image]) -> Result<Entry> {
        let skip = |reason: String| {
            Entry::Skipped(SkippedMachine {
                path: path.to_path_buf(),
                reason,
            })
        };

        let (Some(project), Some(name)) = (
            path.parent().and_then(Path::parent),
            path.file_stem().map(|s| s.to_string_lossy().into_owned()),
        ) else {
            return Ok(skip("unexpected machine config location".to_string()));
        };
        let Some(group) = project.file_name().map(|s| s.to_string_lossy().into_owned()) else {
            return Ok(skip("unexpected machine config location".to_string()));
        };

        let config = match MachineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable machine config");
                return Ok(skip(e.to_string()));
            }
        };

        let image = images.iter().find(|image| {
            image.name == config.box_name
                && config.provider.as_deref().map_or(true, |p| p == image.provider)
        });
        let Some(image) = image.cloned() else {
            debug!(
                path = %path.display(),
                box_name = %config.box_name,
                "Skipping machine whose image no longer exists"
            );
            return Ok(skip(format!("image `{}` not found", config.box_name)));
        };

        let hardware = match self
            .hardware
            .resolve(&config.hardware_id, config.cpus, config.memory_mib)
        {
            Ok(hardware) => hardware,
            Err(e @ ComputeError::HardwareNotFound(_)) => return Err(e),
            Err(e) => return Ok(skip(e.to_string())),
        };

        Ok(Entry::Node(Node {
            id: NodeId::compose(&group, &name),
            hostname: config.hostname.clone().unwrap_or_else(|| name.clone()),
            group,
            name,
            path: project.to_path_buf(),
            image,
            hardware,
            networks: config.networks,
            state: MachineState::Unrecognized,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBoxCatalog;
    use crate::types::BoxRef;

    fn scanner(home: &Path) -> ExistingMachineScanner {
        let catalog = MockBoxCatalog::new(vec![BoxRef::new("ubuntu", "20.04", "virtualbox")]);
        ExistingMachineScanner::new(
            home,
            Arc::new(ImageSupplier::new(Arc::new(catalog))),
            Arc::new(HardwareCatalog::new()),
        )
    }

    fn write(home: &Path, group: &str, machine: &str, contents: &str) {
        let path = machine_config_path(home, group, machine);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_machine_with_missing_image_is_skipped() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), "g1", "m1", "box=ubuntu\nhardwareId=small\n");
        write(home.path(), "g1", "m2", "box=centos\nhardwareId=small\n");

        let report = scanner(home.path()).scan_report().await.unwrap();

        assert_eq!(report.nodes.len(), 1);
        let node = &report.nodes[0];
        assert_eq!(node.id, "g1/m1");
        assert_eq!(node.group, "g1");
        assert_eq!(node.path, home.path().join("g1"));
        assert_eq!(node.image.name, "ubuntu");
        assert_eq!(node.hardware.id, "small");
        assert_eq!(node.state, MachineState::Unrecognized);

        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].path.ends_with("g1/machine-configs/m2.cfg"));
    }

    #[tokio::test]
    async fn test_missing_named_hardware_fails_scan() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), "g1", "m1", "box=ubuntu\nhardwareId=small\n");
        write(home.path(), "g2", "m1", "box=ubuntu\nhardwareId=gigantic\n");

        let err = scanner(home.path()).scan().await.unwrap_err();
        assert!(matches!(err, ComputeError::HardwareNotFound(ref id) if id == "gigantic"));
    }

    #[tokio::test]
    async fn test_automatic_hardware_and_malformed_configs() {
        let home = tempfile::tempdir().unwrap();
        write(
            home.path(),
            "g1",
            "auto",
            "box=ubuntu\nhardwareId=automatic\ncpus=3\nmemory=1536\nhostname=auto.local\n",
        );
        write(home.path(), "g1", "broken", "hardwareId=small\n");
        // Not a machine config location
        std::fs::create_dir_all(home.path().join("boxes/ubuntu/20.04")).unwrap();
        std::fs::write(home.path().join("boxes/ubuntu/20.04/metadata.cfg"), "x").unwrap();

        let report = scanner(home.path()).scan_report().await.unwrap();

        assert_eq!(report.nodes.len(), 1);
        assert_eq!(report.nodes[0].hardware.cores, 3);
        assert_eq!(report.nodes[0].hardware.ram_mib, 1536);
        assert_eq!(report.nodes[0].hostname, "auto.local");
        assert_eq!(report.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_home() {
        let home = tempfile::tempdir().unwrap();
        let nodes = scanner(&home.path().join("missing")).scan().await.unwrap();
        assert!(nodes.is_empty());
    }

    #[tokio::test]
    async fn test_scan_machine_reads_only_that_machine() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), "g1", "m1", "box=ubuntu\nhardwareId=small\n");
        write(home.path(), "g2", "x", "box=ubuntu\nhardwareId=gigantic\n");
        write(home.path(), "g1", "gone", "box=centos\nhardwareId=small\n");
        let scanner = scanner(home.path());

        let node = scanner.scan_machine("g1", "m1").await.unwrap().unwrap();
        assert_eq!(node.id, "g1/m1");
        assert_eq!(node.state, MachineState::Unrecognized);

        assert!(scanner.scan_machine("g1", "none").await.unwrap().is_none());
        assert!(scanner.scan_machine("g1", "gone").await.unwrap().is_none());
        assert!(matches!(
            scanner.scan_machine("g2", "x").await.unwrap_err(),
            ComputeError::HardwareNotFound(_)
        ));
    }
}
