//! One-shot subcommands.

use anyhow::{anyhow, bail, Result};
use serde_json::{json, Value};
use tracing::info;

use vagrant_compute::{NodeTemplate, VagrantComputeService};

use crate::cli::Command;

/// Run a one-shot command and return its JSON result.
///
/// `watch` is long-running and handled by the caller.
pub async fn execute(service: &VagrantComputeService, command: &Command) -> Result<Value> {
    let value = match command {
        Command::Nodes => serde_json::to_value(service.list_nodes().await?)?,
        Command::Node { id } => {
            let node = service
                .get_node(id)
                .await?
                .ok_or_else(|| anyhow!("Node not found: {}", id))?;
            serde_json::to_value(node)?
        }
        Command::Images => serde_json::to_value(service.list_images().await?)?,
        Command::Hardware => {
            let mut profiles = service.list_hardware_profiles();
            profiles.sort_by(|a, b| a.cores.cmp(&b.cores).then(a.ram_mib.cmp(&b.ram_mib)));
            serde_json::to_value(profiles)?
        }
        Command::Create {
            group,
            name,
            image,
            hardware,
            networks,
            hostname,
        } => {
            let mut template = NodeTemplate::new(image, hardware);
            template.networks = networks.clone();
            template.hostname = hostname.clone();
            let created = service.create_node(group, name, &template).await?;
            info!(node_id = %created.node.id, "Node created");
            serde_json::to_value(created)?
        }
        Command::Destroy { id } => {
            service.destroy_node(id).await?;
            json!({ "id": id, "destroyed": true })
        }
        Command::Reboot { id } => serde_json::to_value(service.reboot_node(id).await?)?,
        Command::Suspend { id } => serde_json::to_value(service.suspend_node(id).await?)?,
        Command::Resume { id } => serde_json::to_value(service.resume_node(id).await?)?,
        Command::Watch { .. } => bail!("watch is not a one-shot command"),
    };
    Ok(value)
}
