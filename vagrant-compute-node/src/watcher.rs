//! Node watcher: polls the compute service and reports node changes.
//!
//! Each poll lists every node, compares the states against the previous poll
//! and emits one event per created, updated or deleted node. Listing also
//! drives the registry vacuum, so terminated nodes show up as `Deleted` once
//! their grace period has passed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info, instrument};

use vagrant_compute::{MachineState, Node, Result, VagrantComputeService};

/// Node change event types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum NodeChangeEvent {
    /// Node appeared
    Created { node: Node },
    /// Node state changed
    Updated {
        node: Node,
        previous_state: MachineState,
    },
    /// Node is gone
    Deleted { id: String },
}

impl NodeChangeEvent {
    pub fn node_id(&self) -> &str {
        match self {
            NodeChangeEvent::Created { node } => &node.id,
            NodeChangeEvent::Updated { node, .. } => &node.id,
            NodeChangeEvent::Deleted { id } => id,
        }
    }
}

/// Diff `nodes` against the cached states, updating the cache.
///
/// Events come out sorted by node id, deletions last.
pub fn detect_changes(
    cache: &mut HashMap<String, MachineState>,
    nodes: &[Node],
) -> Vec<NodeChangeEvent> {
    let mut changes = Vec::new();
    let mut seen = HashMap::with_capacity(nodes.len());

    for node in nodes {
        match cache.get(&node.id) {
            None => changes.push(NodeChangeEvent::Created { node: node.clone() }),
            Some(&previous_state) if previous_state != node.state => {
                changes.push(NodeChangeEvent::Updated {
                    node: node.clone(),
                    previous_state,
                })
            }
            Some(_) => {}
        }
        seen.insert(node.id.clone(), node.state);
    }

    let mut deleted: Vec<String> = cache
        .keys()
        .filter(|id| !seen.contains_key(*id))
        .cloned()
        .collect();
    deleted.sort();
    changes.extend(deleted.into_iter().map(|id| NodeChangeEvent::Deleted { id }));

    *cache = seen;
    changes
}

/// Polls `list_nodes` and reports what changed.
pub struct NodeWatcher {
    service: Arc<VagrantComputeService>,
    cached: RwLock<HashMap<String, MachineState>>,
    poll_interval: Duration,
}

impl NodeWatcher {
    pub fn new(service: Arc<VagrantComputeService>, poll_interval: Duration) -> Self {
        Self {
            service,
            cached: RwLock::new(HashMap::new()),
            poll_interval,
        }
    }

    /// One poll: list nodes and diff against the previous poll.
    pub async fn poll_once(&self) -> Result<Vec<NodeChangeEvent>> {
        let nodes = self.service.list_nodes().await?;
        let mut cached = self.cached.write().await;
        Ok(detect_changes(&mut cached, &nodes))
    }

    /// Poll until `shutdown` resolves, handing every change to `on_change`.
    #[instrument(skip_all)]
    pub async fn run<F, S>(&self, mut on_change: F, shutdown: S)
    where
        F: FnMut(&NodeChangeEvent),
        S: Future<Output = ()>,
    {
        info!(poll_interval_secs = self.poll_interval.as_secs(), "Starting node watcher");

        let mut poll_timer = interval(self.poll_interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = poll_timer.tick() => {
                    match self.poll_once().await {
                        Ok(changes) => {
                            if !changes.is_empty() {
                                debug!(change_count = changes.len(), "Detected node changes");
                            }
                            for change in &changes {
                                info!(node_id = %change.node_id(), ?change, "Node changed");
                                on_change(change);
                            }
                        }
                        Err(e) => error!(error = %e, "Failed to poll nodes"),
                    }
                }
                _ = &mut shutdown => {
                    info!("Node watcher stopped");
                    return;
                }
            }
        }
    }
}
