//! Domain types shared by the registry, scanner and compute service.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Metadata key carrying the hypervisor provider a box was packaged for.
pub const PROVIDER_METADATA_KEY: &str = "provider";

/// Prefix of hardware ids that are computed from raw cpu/memory values.
pub const AUTOMATIC_HARDWARE_PREFIX: &str = "automatic";

// =============================================================================
// NODES
// =============================================================================

/// Composite node identifier, `<group>/<name>`.
pub struct NodeId;

impl NodeId {
    /// Build the registry key for a machine inside a group.
    pub fn compose(group: &str, name: &str) -> String {
        format!("{}/{}", group, name)
    }

    /// Split a node id back into `(group, name)`.
    ///
    /// The group is everything before the first slash; machine names never
    /// contain a slash, group names never do either.
    pub fn split(id: &str) -> Option<(&str, &str)> {
        let (group, name) = id.split_once('/')?;
        if group.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some((group, name))
    }
}

/// Power/lifecycle state of a managed machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    /// Being created
    Pending,
    /// Booted and reachable
    Running,
    /// Halted but still present on disk
    Suspended,
    /// Destroyed; kept visible for the registry grace period
    Terminated,
    /// Boot failed
    Error,
    /// Reconstructed from disk without probing the hypervisor
    Unrecognized,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MachineState::Pending => "pending",
            MachineState::Running => "running",
            MachineState::Suspended => "suspended",
            MachineState::Terminated => "terminated",
            MachineState::Error => "error",
            MachineState::Unrecognized => "unrecognized",
        };
        f.write_str(s)
    }
}

/// A managed virtual machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// `<group>/<name>`, primary key in the registry
    pub id: String,
    /// Group (one Vagrant project directory per group)
    pub group: String,
    /// Machine name inside the group's Vagrantfile
    pub name: String,
    /// Owning project directory
    pub path: PathBuf,
    /// Image the machine was booted from
    pub image: Image,
    /// CPU/memory specification
    pub hardware: Hardware,
    /// Network identifiers
    pub networks: Vec<String>,
    /// Guest hostname
    pub hostname: String,
    /// Last known machine state
    pub state: MachineState,
}

impl Node {
    /// Same node with a different state.
    pub fn with_state(mut self, state: MachineState) -> Self {
        self.state = state;
        self
    }
}

/// Input for creating a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeTemplate {
    /// Image id, `<name>/<version>/<provider>`
    pub image_id: String,
    /// Named hardware profile or an `automatic:cores=N;ram=M` spec
    pub hardware_id: String,
    /// Extra networks for the machine
    #[serde(default)]
    pub networks: Vec<String>,
    /// Guest hostname (defaults to the machine name)
    #[serde(default)]
    pub hostname: Option<String>,
}

impl NodeTemplate {
    pub fn new(image_id: impl Into<String>, hardware_id: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
            hardware_id: hardware_id.into(),
            networks: Vec::new(),
            hostname: None,
        }
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.networks.push(network.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }
}

/// SSH access to a booted machine, as reported by `vagrant ssh-config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub user: String,
    /// Only known when the box declares one
    pub password: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub host: String,
    pub port: u16,
}

/// A freshly created node with the credentials needed to reach it.
#[derive(Debug, Clone, Serialize)]
pub struct NodeAndCredentials {
    pub node: Node,
    pub credentials: LoginCredentials,
}

// =============================================================================
// IMAGES
// =============================================================================

/// A raw box entry as reported by the box catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoxRef {
    pub name: String,
    pub version: String,
    pub provider: String,
}

impl BoxRef {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            provider: provider.into(),
        }
    }

    /// Image id derived from this box.
    pub fn image_id(&self) -> String {
        format!("{}/{}/{}", self.name, self.version, self.provider)
    }
}

impl fmt::Display for BoxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.version, self.provider)
    }
}

/// A bootable VM template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// `<name>/<version>/<provider>`
    pub id: String,
    pub name: String,
    pub version: String,
    /// Hypervisor backend the box was packaged for
    pub provider: String,
    /// Guest OS family, when known
    pub os_family: Option<String>,
    pub description: String,
    pub user_metadata: HashMap<String, String>,
}

impl Image {
    /// The box this image was built from.
    pub fn box_ref(&self) -> BoxRef {
        BoxRef::new(&self.name, &self.version, &self.provider)
    }

    /// Hypervisor provider recorded in the user metadata.
    pub fn provider_tag(&self) -> Option<&str> {
        self.user_metadata
            .get(PROVIDER_METADATA_KEY)
            .map(String::as_str)
    }
}

impl From<&BoxRef> for Image {
    fn from(b: &BoxRef) -> Self {
        let mut user_metadata = HashMap::new();
        user_metadata.insert(PROVIDER_METADATA_KEY.to_string(), b.provider.clone());
        Self {
            id: b.image_id(),
            name: b.name.clone(),
            version: b.version.clone(),
            provider: b.provider.clone(),
            os_family: None,
            description: b.to_string(),
            user_metadata,
        }
    }
}

// =============================================================================
// HARDWARE
// =============================================================================

/// CPU/memory specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hardware {
    pub id: String,
    pub name: String,
    pub cores: u32,
    pub ram_mib: u64,
}

impl Hardware {
    pub fn named(id: &str, cores: u32, ram_mib: u64) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            cores,
            ram_mib,
        }
    }

    /// Hardware computed from raw values rather than looked up by name.
    pub fn automatic(cores: u32, ram_mib: u64) -> Self {
        Self {
            id: format!("{}:cores={};ram={}", AUTOMATIC_HARDWARE_PREFIX, cores, ram_mib),
            name: AUTOMATIC_HARDWARE_PREFIX.to_string(),
            cores,
            ram_mib,
        }
    }

    /// Whether a hardware id requests automatic sizing.
    pub fn is_automatic_id(id: &str) -> bool {
        id == AUTOMATIC_HARDWARE_PREFIX
            || id.starts_with(&format!("{}:", AUTOMATIC_HARDWARE_PREFIX))
    }

    /// Parse `automatic:cores=2;ram=1024`.
    pub fn parse_automatic(id: &str) -> Option<(u32, u64)> {
        let spec = id.strip_prefix(AUTOMATIC_HARDWARE_PREFIX)?.strip_prefix(':')?;
        let mut cores = None;
        let mut ram = None;
        for part in spec.split(';') {
            match part.split_once('=') {
                Some(("cores", v)) => cores = v.trim().parse().ok(),
                Some(("ram", v)) => ram = v.trim().parse().ok(),
                _ => {}
            }
        }
        Some((cores?, ram?))
    }
}
