//! # vagrant-compute
//!
//! Node lifecycle management on top of Vagrant.
//!
//! Each group of machines is one Vagrant project directory under the provider
//! home. Every machine in a group has a small `machine-configs/<name>.cfg`
//! file that the group's Vagrantfile reads, which lets the provider rebuild
//! its view of existing machines after a restart.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │            VagrantComputeService              │
//! │  (create, destroy, reboot, suspend, list...)  │
//! └──────┬──────────────┬──────────────┬──────────┘
//!        │              │              │
//!        ▼              ▼              ▼
//! ┌─────────────┐ ┌───────────┐ ┌────────────────────┐
//! │NodeRegistry │ │ Existing  │ │MachineControl      │
//! │ (grace +    │ │ Machine   │ │ (VagrantCli or     │
//! │  vacuum)    │ │ Scanner   │ │  MockVagrant)      │
//! └─────────────┘ └─────┬─────┘ └────────────────────┘
//!                       ▼
//!               ┌───────────────┐
//!               │ ImageSupplier │──► BoxCatalog
//!               └───────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vagrant_compute::{
//!     LocalBoxCatalog, NodeRegistry, NodeTemplate, ProviderConfig, VagrantCliFactory,
//!     VagrantComputeService,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ProviderConfig::from_env();
//!     let service = VagrantComputeService::from_config(
//!         &config,
//!         Arc::new(NodeRegistry::new(config.registry.clone())),
//!         Arc::new(LocalBoxCatalog::new(&config.home)),
//!         Arc::new(VagrantCliFactory::new(&config.vagrant_binary)),
//!     );
//!
//!     let template = NodeTemplate::new("ubuntu/20.04/virtualbox", "small");
//!     let created = service.create_node("web", "web-1", &template).await.unwrap();
//!     println!("ssh {}@{} -p {}", created.credentials.user,
//!         created.credentials.host, created.credentials.port);
//! }
//! ```

pub mod box_config;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod hardware;
pub mod images;
pub mod machine_config;
pub mod mock;
pub mod recorder;
pub mod registry;
pub mod scanner;
pub mod service;
pub mod traits;
pub mod types;
pub mod vagrant;

pub use box_config::BoxConfig;
pub use catalog::LocalBoxCatalog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ProviderConfig;
pub use error::{ComputeError, Result};
pub use hardware::HardwareCatalog;
pub use images::{ImageSupplier, LatestVersionFilter};
pub use machine_config::MachineConfig;
pub use mock::{MockBoxCatalog, MockVagrant};
pub use recorder::{OutputListener, OutputRecorder, WireLogger};
pub use registry::{NodeRegistry, RegistryConfig};
pub use scanner::{ExistingMachineScanner, ScanReport, SkippedMachine};
pub use service::VagrantComputeService;
pub use traits::{BoxCatalog, MachineControl, MachineControlFactory, StaleBoxFilter};
pub use types::*;
pub use vagrant::{VagrantCli, VagrantCliFactory};
