//! In-memory collaborators for testing and development.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::error::{ComputeError, Result};
use crate::images::compare_versions;
use crate::traits::{BoxCatalog, MachineControl, MachineControlFactory};
use crate::types::{BoxRef, LoginCredentials};

/// Box catalog over a fixed list.
#[derive(Debug, Default)]
pub struct MockBoxCatalog {
    boxes: RwLock<Vec<BoxRef>>,
}

impl MockBoxCatalog {
    pub fn new(boxes: Vec<BoxRef>) -> Self {
        Self {
            boxes: RwLock::new(boxes),
        }
    }

    /// Install another box.
    pub fn add(&self, b: BoxRef) -> Result<()> {
        self.boxes
            .write()
            .map_err(|_| ComputeError::Internal("Lock poisoned".to_string()))?
            .push(b);
        Ok(())
    }

    /// Remove every version of a box.
    pub fn remove(&self, name: &str) -> Result<()> {
        self.boxes
            .write()
            .map_err(|_| ComputeError::Internal("Lock poisoned".to_string()))?
            .retain(|b| b.name != name);
        Ok(())
    }
}

#[async_trait]
impl BoxCatalog for MockBoxCatalog {
    async fn list_boxes(&self) -> Result<Vec<BoxRef>> {
        let boxes = self
            .boxes
            .read()
            .map_err(|_| ComputeError::Internal("Lock poisoned".to_string()))?;
        Ok(boxes.clone())
    }

    async fn get_box(&self, name: &str) -> Result<Option<BoxRef>> {
        Ok(self
            .list_boxes()
            .await?
            .into_iter()
            .filter(|b| b.name == name)
            .max_by(|a, b| compare_versions(&a.version, &b.version)))
    }
}

/// Simulated machine power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMachineState {
    Running,
    Halted,
}

#[derive(Default)]
struct MockState {
    machines: RwLock<HashMap<(PathBuf, String), MockMachineState>>,
    failing: RwLock<HashSet<String>>,
    calls: RwLock<Vec<String>>,
}

impl MockState {
    fn record(&self, call: String) -> Result<()> {
        self.calls
            .write()
            .map_err(|_| ComputeError::Internal("Lock poisoned".to_string()))?
            .push(call);
        Ok(())
    }

    fn is_failing(&self, machine: &str) -> Result<bool> {
        Ok(self
            .failing
            .read()
            .map_err(|_| ComputeError::Internal("Lock poisoned".to_string()))?
            .contains(machine))
    }
}

/// Simulated Vagrant: a factory whose projects share one machine table.
///
/// Useful for:
/// - Unit and integration testing
/// - Running the node daemon without Vagrant installed
#[derive(Clone, Default)]
pub struct MockVagrant {
    state: Arc<MockState>,
}

impl MockVagrant {
    pub fn new() -> Self {
        info!("Creating mock Vagrant control");
        Self::default()
    }

    /// Make every later call for `machine` fail.
    pub fn fail_machine(&self, machine: &str) -> Result<()> {
        self.state
            .failing
            .write()
            .map_err(|_| ComputeError::Internal("Lock poisoned".to_string()))?
            .insert(machine.to_string());
        Ok(())
    }

    /// Simulated state of a machine, `None` when it does not exist.
    pub fn machine_state(&self, project: &Path, machine: &str) -> Option<MockMachineState> {
        self.state
            .machines
            .read()
            .ok()?
            .get(&(project.to_path_buf(), machine.to_string()))
            .copied()
    }

    /// Calls made so far, as `"<verb> <machine>"`.
    pub fn calls(&self) -> Vec<String> {
        self.state
            .calls
            .read()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl MachineControlFactory for MockVagrant {
    fn for_project(&self, project: &Path) -> Arc<dyn MachineControl> {
        Arc::new(MockProject {
            project: project.to_path_buf(),
            state: self.state.clone(),
        })
    }
}

struct MockProject {
    project: PathBuf,
    state: Arc<MockState>,
}

impl MockProject {
    fn key(&self, machine: &str) -> (PathBuf, String) {
        (self.project.clone(), machine.to_string())
    }

    fn begin(&self, verb: &str, machine: &str) -> Result<()> {
        self.state.record(format!("{} {}", verb, machine))?;
        if self.state.is_failing(machine)? {
            return Err(ComputeError::ProcessFailed {
                command: format!("vagrant {} {}", verb, machine),
                output: format!("The machine '{}' failed to {}.\n", machine, verb),
            });
        }
        Ok(())
    }

    fn set_state(&self, machine: &str, state: MockMachineState) -> Result<()> {
        let mut machines = self
            .state
            .machines
            .write()
            .map_err(|_| ComputeError::Internal("Lock poisoned".to_string()))?;
        let entry = machines.get_mut(&self.key(machine)).ok_or_else(|| {
            ComputeError::ProcessFailed {
                command: format!("vagrant halt {}", machine),
                output: format!("The machine '{}' has not been created.\n", machine),
            }
        })?;
        *entry = state;
        Ok(())
    }
}

#[async_trait]
impl MachineControl for MockProject {
    #[instrument(skip(self), fields(project = %self.project.display()))]
    async fn up(&self, machine: &str) -> Result<String> {
        self.begin("up", machine)?;
        self.state
            .machines
            .write()
            .map_err(|_| ComputeError::Internal("Lock poisoned".to_string()))?
            .insert(self.key(machine), MockMachineState::Running);
        debug!("Mock machine running");
        Ok(format!(
            "Bringing machine '{}' up with 'mock' provider...\n==> {}: Machine booted and ready!\n",
            machine, machine
        ))
    }

    async fn halt(&self, machine: &str) -> Result<()> {
        self.begin("halt", machine)?;
        self.set_state(machine, MockMachineState::Halted)
    }

    async fn halt_forced(&self, machine: &str) -> Result<()> {
        self.begin("halt-forced", machine)?;
        self.set_state(machine, MockMachineState::Halted)
    }

    async fn destroy(&self, machine: &str) -> Result<()> {
        self.begin("destroy", machine)?;
        self.state
            .machines
            .write()
            .map_err(|_| ComputeError::Internal("Lock poisoned".to_string()))?
            .remove(&self.key(machine));
        Ok(())
    }

    async fn ssh_config(&self, machine: &str) -> Result<LoginCredentials> {
        self.begin("ssh-config", machine)?;
        Ok(LoginCredentials {
            user: "vagrant".to_string(),
            password: None,
            private_key_path: Some(
                self.project
                    .join(".vagrant/machines")
                    .join(machine)
                    .join("mock/private_key"),
            ),
            host: "127.0.0.1".to_string(),
            port: 2222,
        })
    }

    async fn exists(&self) -> bool {
        self.project.join("Vagrantfile").is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_machine_lifecycle() {
        let vagrant = MockVagrant::new();
        let project = Path::new("/tmp/g1");
        let control = vagrant.for_project(project);

        let transcript = control.up("m1").await.unwrap();
        assert!(transcript.contains("Machine booted"));
        assert_eq!(vagrant.machine_state(project, "m1"), Some(MockMachineState::Running));

        control.halt("m1").await.unwrap();
        assert_eq!(vagrant.machine_state(project, "m1"), Some(MockMachineState::Halted));

        control.destroy("m1").await.unwrap();
        assert_eq!(vagrant.machine_state(project, "m1"), None);
        assert!(control.halt("m1").await.is_err());

        assert_eq!(vagrant.calls(), vec!["up m1", "halt m1", "destroy m1", "halt m1"]);
    }

    #[tokio::test]
    async fn test_failing_machine() {
        let vagrant = MockVagrant::new();
        vagrant.fail_machine("bad").unwrap();
        let control = vagrant.for_project(Path::new("/tmp/g1"));

        let err = control.up("bad").await.unwrap_err();
        assert!(matches!(err, ComputeError::ProcessFailed { .. }));
        assert_eq!(vagrant.machine_state(Path::new("/tmp/g1"), "bad"), None);
    }
}
