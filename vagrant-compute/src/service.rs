//! Compute service: create, list, reboot and destroy Vagrant nodes.
//!
//! A create reserves its id in the registry as `Pending` up front. Other state
//! changes go through the project's `MachineControl` first and are written to
//! the registry only once the external call has succeeded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::box_config::BoxConfig;
use crate::config::ProviderConfig;
use crate::error::{ComputeError, Result};
use crate::hardware::HardwareCatalog;
use crate::images::ImageSupplier;
use crate::machine_config::{machine_config_path, MachineConfig};
use crate::registry::NodeRegistry;
use crate::scanner::ExistingMachineScanner;
use crate::traits::{BoxCatalog, MachineControl, MachineControlFactory};
use crate::types::{
    Hardware, Image, MachineState, Node, NodeAndCredentials, NodeId, NodeTemplate,
    AUTOMATIC_HARDWARE_PREFIX,
};

/// Vagrantfile written into each group directory. Machines come from
/// `machine-configs/*.cfg`.
const GROUP_VAGRANTFILE: &str = r##"# Generated by vagrant-compute. Machines are defined in machine-configs/*.cfg.
Vagrant.configure("2") do |config|
  Dir.glob(File.join(__dir__, "machine-configs", "*.cfg")).sort.each do |path|
    cfg = {}
    File.readlines(path).each do |line|
      line = line.strip
      next if line.empty? || line.start_with?("#")
      key, value = line.split("=", 2)
      cfg[key.strip] = value.to_s.strip
    end

    config.vm.define File.basename(path, ".cfg"), autostart: false do |machine|
      machine.vm.box = cfg["box"]
      machine.vm.box_version = cfg["boxVersion"] if cfg["boxVersion"]
      machine.vm.hostname = cfg["hostname"] if cfg["hostname"]
      cfg.fetch("networks", "").split(",").map(&:strip).reject(&:empty?).each do |net|
        machine.vm.network "private_network", type: "dhcp", name: net
      end
      machine.vm.provider cfg.fetch("provider", "virtualbox").to_sym do |p|
        p.cpus = cfg["cpus"].to_i if cfg["cpus"]
        p.memory = cfg["memory"].to_i if cfg["memory"]
      end
    end
  end
end
"##;

/// Orchestration surface over one provider home.
pub struct VagrantComputeService {
    home: PathBuf,
    registry: Arc<NodeRegistry>,
    images: Arc<ImageSupplier>,
    hardware: Arc<HardwareCatalog>,
    scanner: ExistingMachineScanner,
    controls: Arc<dyn MachineControlFactory>,
}

impl VagrantComputeService {
    pub fn new(
        home: impl Into<PathBuf>,
        registry: Arc<NodeRegistry>,
        images: Arc<ImageSupplier>,
        hardware: Arc<HardwareCatalog>,
        controls: Arc<dyn MachineControlFactory>,
    ) -> Self {
        let home = home.into();
        let scanner = ExistingMachineScanner::new(&home, images.clone(), hardware.clone());
        Self {
            home,
            registry,
            images,
            hardware,
            scanner,
            controls,
        }
    }

    /// Wire a service from configuration with the built-in hardware profiles.
    pub fn from_config(
        config: &ProviderConfig,
        registry: Arc<NodeRegistry>,
        catalog: Arc<dyn BoxCatalog>,
        controls: Arc<dyn MachineControlFactory>,
    ) -> Self {
        Self::new(
            &config.home,
            registry,
            Arc::new(ImageSupplier::new(catalog)),
            Arc::new(HardwareCatalog::new()),
            controls,
        )
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Boot a new machine `name` in `group`.
    ///
    /// The id is reserved as `Pending` before anything touches the disk, so
    /// concurrent creates of the same id cannot both proceed. If any step
    /// after the machine config is written fails, the machine is torn down,
    /// the config removed and the reservation released; the error carries
    /// the console transcript when the boot itself failed.
    #[instrument(skip(self, template), fields(image = %template.image_id, hardware = %template.hardware_id))]
    pub async fn create_node(
        &self,
        group: &str,
        name: &str,
        template: &NodeTemplate,
    ) -> Result<NodeAndCredentials> {
        validate_name("group", group)?;
        validate_name("machine", name)?;

        let image = self
            .images
            .apply(&template.image_id)
            .await?
            .ok_or_else(|| ComputeError::ImageNotFound(template.image_id.clone()))?;
        let hardware = self.hardware.resolve(&template.hardware_id, None, None)?;
        let box_config = BoxConfig::load(&self.home, &image.box_ref())?;

        let pending = Node {
            id: NodeId::compose(group, name),
            group: group.to_string(),
            name: name.to_string(),
            path: self.home.join(group),
            image: Image {
                os_family: box_config.guest().or(image.os_family.clone()),
                ..image
            },
            hardware,
            networks: template.networks.clone(),
            hostname: template.hostname.clone().unwrap_or_else(|| name.to_string()),
            state: MachineState::Pending,
        };
        if !self.registry.try_add(pending.clone()) {
            return Err(ComputeError::InvalidArgument(format!(
                "node {} already exists",
                pending.id
            )));
        }

        match self.provision(&pending, template, &box_config).await {
            Ok(created) => {
                info!(node_id = %pending.id, "Node running");
                Ok(created)
            }
            Err(e) => {
                self.registry.remove_pending(&pending.id);
                Err(e)
            }
        }
    }

    /// Write the machine config and boot a reserved node.
    async fn provision(
        &self,
        pending: &Node,
        template: &NodeTemplate,
        box_config: &BoxConfig,
    ) -> Result<NodeAndCredentials> {
        let project = self.ensure_project(&pending.group)?;
        let config_path = machine_config_path(&self.home, &pending.group, &pending.name);
        MachineConfig {
            box_name: pending.image.name.clone(),
            box_version: Some(pending.image.version.clone()),
            provider: Some(pending.image.provider.clone()),
            hardware_id: persisted_hardware_id(&pending.hardware),
            cpus: Some(pending.hardware.cores),
            memory_mib: Some(pending.hardware.ram_mib),
            networks: template.networks.clone(),
            hostname: template.hostname.clone(),
        }
        .save(&config_path)?;

        let control = self.controls.for_project(&project);
        match self.boot(control.as_ref(), pending, box_config).await {
            Ok(created) => Ok(created),
            Err(e) => {
                warn!(node_id = %pending.id, error = %e, "Node failed to come up, discarding it");
                discard_machine(control.as_ref(), &pending.name).await;
                remove_machine_config(&config_path);
                Err(e)
            }
        }
    }

    async fn boot(
        &self,
        control: &dyn MachineControl,
        pending: &Node,
        box_config: &BoxConfig,
    ) -> Result<NodeAndCredentials> {
        info!(node_id = %pending.id, "Booting node");
        let transcript = control.up(&pending.name).await?;
        debug!(node_id = %pending.id, lines = transcript.lines().count(), "Boot transcript captured");

        let mut credentials = control.ssh_config(&pending.name).await?;
        if credentials.password.is_none() {
            credentials.password = box_config.ssh_password();
        }

        let node = pending.clone().with_state(MachineState::Running);
        self.registry.add(node.clone());
        Ok(NodeAndCredentials { node, credentials })
    }

    /// Tear a node down. The node stays visible as `Terminated` for the
    /// registry grace period.
    #[instrument(skip(self))]
    pub async fn destroy_node(&self, id: &str) -> Result<()> {
        let node = self.find_node(id).await?;
        match node.state {
            MachineState::Terminated => {
                debug!("Node already terminated");
                return Ok(());
            }
            MachineState::Pending => {
                return Err(ComputeError::InvalidArgument(format!(
                    "node {} is still being created",
                    id
                )));
            }
            _ => {}
        }

        let control = self.controls.for_project(&node.path);
        if node.state != MachineState::Suspended {
            control.halt_forced(&node.name).await?;
        }
        control.destroy(&node.name).await?;

        remove_machine_config(&machine_config_path(&self.home, &node.group, &node.name));

        let terminated = node.with_state(MachineState::Terminated);
        self.registry.add(terminated.clone());
        self.registry.on_terminated(terminated);

        info!("Node destroyed");
        Ok(())
    }

    /// Halt and boot a node again.
    #[instrument(skip(self))]
    pub async fn reboot_node(&self, id: &str) -> Result<Node> {
        let node = self.find_live_node(id).await?;
        let control = self.controls.for_project(&node.path);
        control.halt(&node.name).await?;
        control.up(&node.name).await?;
        Ok(self.record_state(node, MachineState::Running))
    }

    /// Halt a node, keeping it on disk.
    #[instrument(skip(self))]
    pub async fn suspend_node(&self, id: &str) -> Result<Node> {
        let node = self.find_live_node(id).await?;
        self.controls.for_project(&node.path).halt(&node.name).await?;
        Ok(self.record_state(node, MachineState::Suspended))
    }

    /// Boot a halted node.
    #[instrument(skip(self))]
    pub async fn resume_node(&self, id: &str) -> Result<Node> {
        let node = self.find_live_node(id).await?;
        self.controls.for_project(&node.path).up(&node.name).await?;
        Ok(self.record_state(node, MachineState::Running))
    }

    /// Look up a node, falling back to its machine config on disk.
    pub async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        if let Some(node) = self.registry.get(id) {
            return Ok(Some(node));
        }
        let Some((group, name)) = NodeId::split(id) else {
            return Ok(None);
        };
        let found = self.scanner.scan_machine(group, name).await?;
        if let Some(node) = &found {
            // A concurrent create may have reserved the id meanwhile
            if !self.registry.try_add(node.clone()) {
                return Ok(self.registry.get(id));
            }
        }
        Ok(found)
    }

    /// Every known node: machines on disk merged with the registry.
    ///
    /// Registry entries win over scanned ones, and registry-only entries such
    /// as recently terminated nodes are kept.
    #[instrument(skip(self))]
    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        let scanned = self.scanner.scan().await?;
        let mut nodes: BTreeMap<String, Node> = BTreeMap::new();

        for node in scanned {
            if self.registry.try_add(node.clone()) {
                debug!(node_id = %node.id, "Registering machine found on disk");
                nodes.insert(node.id.clone(), node);
            } else if let Some(known) = self.registry.get(&node.id) {
                nodes.insert(known.id.clone(), known);
            }
        }
        for node in self.registry.list() {
            nodes.entry(node.id.clone()).or_insert(node);
        }

        Ok(nodes.into_values().collect())
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub async fn list_images(&self) -> Result<Vec<Image>> {
        self.images.get().await
    }

    pub async fn get_image(&self, id: &str) -> Result<Option<Image>> {
        self.images.apply(id).await
    }

    pub fn list_hardware_profiles(&self) -> Vec<Hardware> {
        self.hardware.list()
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn find_node(&self, id: &str) -> Result<Node> {
        self.get_node(id)
            .await?
            .ok_or_else(|| ComputeError::NodeNotFound(id.to_string()))
    }

    async fn find_live_node(&self, id: &str) -> Result<Node> {
        let node = self.find_node(id).await?;
        match node.state {
            MachineState::Terminated => Err(ComputeError::NodeNotFound(id.to_string())),
            MachineState::Pending => Err(ComputeError::InvalidArgument(format!(
                "node {} is still being created",
                id
            ))),
            _ => Ok(node),
        }
    }

    fn record_state(&self, node: Node, state: MachineState) -> Node {
        let node = node.with_state(state);
        self.registry.add(node.clone());
        info!(node_id = %node.id, %state, "Node state updated");
        node
    }

    /// Create the group directory and its Vagrantfile if missing.
    fn ensure_project(&self, group: &str) -> Result<PathBuf> {
        let project = self.home.join(group);
        std::fs::create_dir_all(&project).map_err(|e| ComputeError::io(&project, e))?;
        let vagrantfile = project.join("Vagrantfile");
        if !vagrantfile.exists() {
            std::fs::write(&vagrantfile, GROUP_VAGRANTFILE)
                .map_err(|e| ComputeError::io(&vagrantfile, e))?;
            debug!(path = %vagrantfile.display(), "Wrote group Vagrantfile");
        }
        Ok(project)
    }
}

fn persisted_hardware_id(hardware: &Hardware) -> String {
    if Hardware::is_automatic_id(&hardware.id) {
        AUTOMATIC_HARDWARE_PREFIX.to_string()
    } else {
        hardware.id.clone()
    }
}

/// Best-effort teardown of a machine whose creation failed.
async fn discard_machine(control: &dyn MachineControl, name: &str) {
    if let Err(e) = control.halt_forced(name).await {
        debug!(machine = name, error = %e, "Forced halt during cleanup failed");
    }
    if let Err(e) = control.destroy(name).await {
        warn!(machine = name, error = %e, "Failed to destroy machine during cleanup");
    }
}

fn remove_machine_config(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove machine config"),
    }
}

fn validate_name(kind: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value != "boxes"
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !value.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(ComputeError::InvalidArgument(format!(
            "invalid {} name: {:?}",
            kind, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mock::{MockBoxCatalog, MockMachineState, MockVagrant};
    use crate::registry::{RegistryConfig, DEFAULT_GRACE_PERIOD, DEFAULT_VACUUM_INTERVAL};
    use crate::types::BoxRef;

    struct Fixture {
        home: tempfile::TempDir,
        vagrant: MockVagrant,
        clock: Arc<ManualClock>,
        service: VagrantComputeService,
    }

    fn fixture() -> Fixture {
        let home = tempfile::tempdir().unwrap();
        let ubuntu = BoxRef::new("ubuntu", "20.04", "virtualbox");
        let box_dir = crate::box_config::box_dir(home.path(), &ubuntu);
        std::fs::create_dir_all(&box_dir).unwrap();
        std::fs::write(
            box_dir.join("Vagrantfile"),
            "config.vm.guest = :linux\nconfig.ssh.password = \"vagrant\"\n",
        )
        .unwrap();

        let vagrant = MockVagrant::new();
        let clock = Arc::new(ManualClock::default());
        let registry = Arc::new(NodeRegistry::with_clock(RegistryConfig::default(), clock.clone()));
        let catalog = Arc::new(MockBoxCatalog::new(vec![
            ubuntu,
            // Installed but missing its Vagrantfile
            BoxRef::new("centos", "7", "virtualbox"),
        ]));
        let service = VagrantComputeService::new(
            home.path(),
            registry,
            Arc::new(ImageSupplier::new(catalog)),
            Arc::new(HardwareCatalog::new()),
            Arc::new(vagrant.clone()),
        );
        Fixture {
            home,
            vagrant,
            clock,
            service,
        }
    }

    #[tokio::test]
    async fn test_create_node() {
        let f = fixture();
        let template = NodeTemplate::new("ubuntu/20.04/virtualbox", "small").with_network("private");

        let created = f.service.create_node("g1", "m1", &template).await.unwrap();

        assert_eq!(created.node.id, "g1/m1");
        assert_eq!(created.node.state, MachineState::Running);
        assert_eq!(created.node.image.os_family.as_deref(), Some("linux"));
        assert_eq!(created.credentials.user, "vagrant");
        assert_eq!(created.credentials.password.as_deref(), Some("vagrant"));
        assert!(f.home.path().join("g1/Vagrantfile").is_file());

        let saved = MachineConfig::load(&machine_config_path(f.home.path(), "g1", "m1")).unwrap();
        assert_eq!(saved.hardware_id, "small");
        assert_eq!(saved.networks, vec!["private"]);

        assert_eq!(
            f.service.registry().get("g1/m1").map(|n| n.state),
            Some(MachineState::Running)
        );
        assert_eq!(
            f.vagrant.machine_state(&f.home.path().join("g1"), "m1"),
            Some(MockMachineState::Running)
        );
    }

    #[tokio::test]
    async fn test_failed_boot_leaves_no_trace() {
        let f = fixture();
        f.vagrant.fail_machine("m1").unwrap();

        let err = f
            .service
            .create_node("g1", "m1", &NodeTemplate::new("ubuntu/20.04/virtualbox", "small"))
            .await
            .unwrap_err();

        match err {
            ComputeError::ProcessFailed { output, .. } => assert!(output.contains("failed to up")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(f.service.registry().get("g1/m1").is_none());
        assert!(!machine_config_path(f.home.path(), "g1", "m1").exists());
        assert!(f.service.list_nodes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let f = fixture();

        let err = f
            .service
            .create_node("g1", "m1", &NodeTemplate::new("fedora/39/virtualbox", "small"))
            .await
            .unwrap_err();
        assert!(matches!(err, ComputeError::ImageNotFound(_)));

        let err = f
            .service
            .create_node("g1", "m1", &NodeTemplate::new("centos/7/virtualbox", "small"))
            .await
            .unwrap_err();
        assert!(matches!(err, ComputeError::MissingBoxConfig { .. }));

        let err = f
            .service
            .create_node("g1", "m1", &NodeTemplate::new("ubuntu/20.04/virtualbox", "jumbo"))
            .await
            .unwrap_err();
        assert!(matches!(err, ComputeError::HardwareNotFound(_)));

        let err = f
            .service
            .create_node("g1", "a/b", &NodeTemplate::new("ubuntu/20.04/virtualbox", "small"))
            .await
            .unwrap_err();
        assert!(matches!(err, ComputeError::InvalidArgument(_)));

        assert!(f.vagrant.calls().is_empty());
        assert!(f.service.registry().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let f = fixture();
        let template = NodeTemplate::new("ubuntu/20.04/virtualbox", "automatic:cores=2;ram=1024");
        f.service.create_node("g1", "m1", &template).await.unwrap();

        let err = f.service.create_node("g1", "m1", &template).await.unwrap_err();
        assert!(matches!(err, ComputeError::InvalidArgument(_)));

        let saved = MachineConfig::load(&machine_config_path(f.home.path(), "g1", "m1")).unwrap();
        assert_eq!(saved.hardware_id, "automatic");
        assert_eq!(saved.cpus, Some(2));
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let f = fixture();
        let template = NodeTemplate::new("ubuntu/20.04/virtualbox", "small");
        f.service.create_node("g1", "m1", &template).await.unwrap();

        let node = f.service.suspend_node("g1/m1").await.unwrap();
        assert_eq!(node.state, MachineState::Suspended);
        assert_eq!(
            f.service.registry().get("g1/m1").map(|n| n.state),
            Some(MachineState::Suspended)
        );

        let node = f.service.resume_node("g1/m1").await.unwrap();
        assert_eq!(node.state, MachineState::Running);

        let node = f.service.reboot_node("g1/m1").await.unwrap();
        assert_eq!(node.state, MachineState::Running);

        assert!(matches!(
            f.service.reboot_node("g1/nope").await.unwrap_err(),
            ComputeError::NodeNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_failed_transition_keeps_state() {
        let f = fixture();
        let template = NodeTemplate::new("ubuntu/20.04/virtualbox", "small");
        f.service.create_node("g1", "m1", &template).await.unwrap();
        f.vagrant.fail_machine("m1").unwrap();

        assert!(f.service.suspend_node("g1/m1").await.is_err());
        assert!(f.service.destroy_node("g1/m1").await.is_err());
        assert_eq!(
            f.service.registry().get("g1/m1").map(|n| n.state),
            Some(MachineState::Running)
        );
    }

    #[tokio::test]
    async fn test_destroy_keeps_node_for_grace_period() {
        let f = fixture();
        let template = NodeTemplate::new("ubuntu/20.04/virtualbox", "small");
        f.service.create_node("g1", "m1", &template).await.unwrap();

        f.service.destroy_node("g1/m1").await.unwrap();
        assert!(!machine_config_path(f.home.path(), "g1", "m1").exists());
        assert_eq!(
            f.service.get_node("g1/m1").await.unwrap().map(|n| n.state),
            Some(MachineState::Terminated)
        );
        // Terminated nodes still show up in listings
        let listed = f.service.list_nodes().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state, MachineState::Terminated);

        // Destroying twice is a no-op
        f.service.destroy_node("g1/m1").await.unwrap();

        f.clock.advance(DEFAULT_GRACE_PERIOD + DEFAULT_VACUUM_INTERVAL);
        assert!(f.service.get_node("g1/m1").await.unwrap().is_none());
        assert!(matches!(
            f.service.destroy_node("g1/m1").await.unwrap_err(),
            ComputeError::NodeNotFound(_)
        ));
        assert_eq!(
            f.vagrant.calls(),
            vec!["up m1", "ssh-config m1", "halt-forced m1", "destroy m1"]
        );
    }

    #[tokio::test]
    async fn test_list_nodes_adopts_machines_on_disk() {
        let f = fixture();
        let path = machine_config_path(f.home.path(), "legacy", "old");
        MachineConfig {
            box_name: "ubuntu".into(),
            box_version: None,
            provider: None,
            hardware_id: "medium".into(),
            cpus: None,
            memory_mib: None,
            networks: Vec::new(),
            hostname: None,
        }
        .save(&path)
        .unwrap();
        f.service
            .create_node("g1", "m1", &NodeTemplate::new("ubuntu/20.04/virtualbox", "small"))
            .await
            .unwrap();

        let nodes = f.service.list_nodes().await.unwrap();
        let summary: Vec<(String, MachineState)> =
            nodes.iter().map(|n| (n.id.clone(), n.state)).collect();
        assert_eq!(
            summary,
            vec![
                ("g1/m1".to_string(), MachineState::Running),
                ("legacy/old".to_string(), MachineState::Unrecognized),
            ]
        );
        assert!(f.service.registry().get("legacy/old").is_some());

        // Adopted machines can be driven like fresh ones
        let node = f.service.resume_node("legacy/old").await.unwrap();
        assert_eq!(node.state, MachineState::Running);
    }

    /// Box catalog that yields before answering, so concurrent creates interleave.
    struct YieldingCatalog(MockBoxCatalog);

    #[async_trait::async_trait]
    impl BoxCatalog for YieldingCatalog {
        async fn list_boxes(&self) -> Result<Vec<BoxRef>> {
            tokio::task::yield_now().await;
            self.0.list_boxes().await
        }

        async fn get_box(&self, name: &str) -> Result<Option<BoxRef>> {
            tokio::task::yield_now().await;
            self.0.get_box(name).await
        }
    }

    /// Machine control whose `ssh-config` always fails.
    struct NoSsh(Arc<dyn MachineControl>);

    #[async_trait::async_trait]
    impl MachineControl for NoSsh {
        async fn up(&self, machine: &str) -> Result<String> {
            self.0.up(machine).await
        }
        async fn halt(&self, machine: &str) -> Result<()> {
            self.0.halt(machine).await
        }
        async fn halt_forced(&self, machine: &str) -> Result<()> {
            self.0.halt_forced(machine).await
        }
        async fn destroy(&self, machine: &str) -> Result<()> {
            self.0.destroy(machine).await
        }
        async fn ssh_config(&self, machine: &str) -> Result<crate::types::LoginCredentials> {
            Err(ComputeError::ProcessFailed {
                command: format!("vagrant ssh-config {}", machine),
                output: "ssh not ready".to_string(),
            })
        }
        async fn exists(&self) -> bool {
            self.0.exists().await
        }
    }

    struct NoSshFactory(MockVagrant);

    impl MachineControlFactory for NoSshFactory {
        fn for_project(&self, project: &Path) -> Arc<dyn MachineControl> {
            Arc::new(NoSsh(self.0.for_project(project)))
        }
    }

    #[tokio::test]
    async fn test_group_vagrantfile_reads_machine_configs() {
        let f = fixture();
        f.service
            .create_node("g1", "m1", &NodeTemplate::new("ubuntu/20.04/virtualbox", "small"))
            .await
            .unwrap();

        let vagrantfile = std::fs::read_to_string(f.home.path().join("g1/Vagrantfile")).unwrap();
        assert!(vagrantfile.contains(r##"line.start_with?("#")"##));
        assert!(vagrantfile.contains(r#""machine-configs", "*.cfg""#));
        assert!(vagrantfile.trim_end().ends_with("end"));
    }

    #[tokio::test]
    async fn test_concurrent_creates_of_one_id() {
        let home = tempfile::tempdir().unwrap();
        let ubuntu = BoxRef::new("ubuntu", "20.04", "virtualbox");
        let box_dir = crate::box_config::box_dir(home.path(), &ubuntu);
        std::fs::create_dir_all(&box_dir).unwrap();
        std::fs::write(box_dir.join("Vagrantfile"), "").unwrap();

        let vagrant = MockVagrant::new();
        let service = VagrantComputeService::new(
            home.path(),
            Arc::new(NodeRegistry::default()),
            Arc::new(ImageSupplier::new(Arc::new(YieldingCatalog(MockBoxCatalog::new(
                vec![ubuntu],
            ))))),
            Arc::new(HardwareCatalog::new()),
            Arc::new(vagrant.clone()),
        );

        let small = NodeTemplate::new("ubuntu/20.04/virtualbox", "small");
        let large = NodeTemplate::new("ubuntu/20.04/virtualbox", "large");
        let (first, second) = tokio::join!(
            service.create_node("g1", "m1", &small),
            service.create_node("g1", "m1", &large)
        );

        assert_eq!(first.unwrap().node.hardware.id, "small");
        assert!(matches!(second.unwrap_err(), ComputeError::InvalidArgument(_)));
        assert_eq!(vagrant.calls(), vec!["up m1", "ssh-config m1"]);

        let saved = MachineConfig::load(&machine_config_path(home.path(), "g1", "m1")).unwrap();
        assert_eq!(saved.hardware_id, "small");
        assert_eq!(
            service.registry().get("g1/m1").map(|n| n.state),
            Some(MachineState::Running)
        );
    }

    #[tokio::test]
    async fn test_failure_after_boot_tears_machine_down() {
        let f = fixture();
        let service = VagrantComputeService::new(
            f.home.path(),
            Arc::new(NodeRegistry::default()),
            Arc::new(ImageSupplier::new(Arc::new(MockBoxCatalog::new(vec![BoxRef::new(
                "ubuntu", "20.04", "virtualbox",
            )])))),
            Arc::new(HardwareCatalog::new()),
            Arc::new(NoSshFactory(f.vagrant.clone())),
        );

        let err = service
            .create_node("g1", "m1", &NodeTemplate::new("ubuntu/20.04/virtualbox", "small"))
            .await
            .unwrap_err();

        assert!(matches!(err, ComputeError::ProcessFailed { .. }));
        assert!(!machine_config_path(f.home.path(), "g1", "m1").exists());
        assert_eq!(f.vagrant.machine_state(&f.home.path().join("g1"), "m1"), None);
        assert_eq!(f.vagrant.calls(), vec!["up m1", "halt-forced m1", "destroy m1"]);
        assert!(service.registry().is_empty());
        assert!(service.list_nodes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_node_ignores_unrelated_configs() {
        let f = fixture();
        MachineConfig {
            box_name: "ubuntu".into(),
            box_version: None,
            provider: None,
            hardware_id: "gigantic".into(),
            cpus: None,
            memory_mib: None,
            networks: Vec::new(),
            hostname: None,
        }
        .save(&machine_config_path(f.home.path(), "g2", "x"))
        .unwrap();

        assert!(f.service.get_node("g1/none").await.unwrap().is_none());
        assert!(f.service.get_node("not-an-id").await.unwrap().is_none());
        assert!(matches!(
            f.service.reboot_node("g1/none").await.unwrap_err(),
            ComputeError::NodeNotFound(_)
        ));
    }
}
