//! In-memory node registry with delayed removal of terminated nodes.
//!
//! Terminated nodes are not dropped immediately: state-change pollers racing
//! with a destroy must still be able to observe `Terminated`. Instead the node
//! is queued with an expiry timestamp and a throttled vacuum pass, run lazily
//! from `get`, removes it once the grace period has elapsed.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::types::{MachineState, Node};

/// How long a terminated node stays visible.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Minimum spacing between two vacuum passes.
pub const DEFAULT_VACUUM_INTERVAL: Duration = Duration::from_secs(15);

/// Registry timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Seconds a terminated node remains visible
    pub grace_period_secs: u64,
    /// Seconds between vacuum passes
    pub vacuum_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: DEFAULT_GRACE_PERIOD.as_secs(),
            vacuum_interval_secs: DEFAULT_VACUUM_INTERVAL.as_secs(),
        }
    }
}

impl RegistryConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn vacuum_interval(&self) -> Duration {
        Duration::from_secs(self.vacuum_interval_secs)
    }
}

/// A node waiting out its grace period.
#[derive(Debug, Clone)]
struct TerminatedNode {
    node: Node,
    expires_at: DateTime<Utc>,
}

impl PartialEq for TerminatedNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TerminatedNode {}

impl PartialOrd for TerminatedNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TerminatedNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.expires_at
            .cmp(&other.expires_at)
            .then_with(|| self.node.id.cmp(&other.node.id))
    }
}

/// Thread-safe map from node id to node, shared by every consumer.
///
/// Construct one per provider instance and hand it around in an `Arc`.
pub struct NodeRegistry {
    nodes: DashMap<String, Node>,
    /// Min-heap on expiry
    terminated: Mutex<BinaryHeap<Reverse<TerminatedNode>>>,
    /// Millis since epoch of the last vacuum. Relaxed: a racing double vacuum is harmless.
    last_vacuum_ms: AtomicI64,
    clock: Arc<dyn Clock>,
    grace_period: chrono::Duration,
    vacuum_interval_ms: i64,
}

impl NodeRegistry {
    /// Registry on the system clock.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Registry on a caller-supplied clock.
    pub fn with_clock(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        let grace_period = chrono::Duration::from_std(config.grace_period())
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_GRACE_PERIOD.as_secs() as i64));
        Self {
            nodes: DashMap::new(),
            terminated: Mutex::new(BinaryHeap::new()),
            last_vacuum_ms: AtomicI64::new(i64::MIN),
            clock,
            grace_period,
            vacuum_interval_ms: config.vacuum_interval().as_millis() as i64,
        }
    }

    /// Current entry for `id`, after an opportunistic vacuum.
    pub fn get(&self, id: &str) -> Option<Node> {
        self.vacuum();
        self.nodes.get(id).map(|entry| entry.value().clone())
    }

    /// Insert or overwrite the entry for `node.id`.
    pub fn add(&self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Insert `node` only if its id is free. Returns whether it was inserted.
    pub fn try_add(&self, node: Node) -> bool {
        match self.nodes.entry(node.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(node);
                true
            }
        }
    }

    /// Drop a `Pending` reservation. Entries in any other state are kept.
    pub fn remove_pending(&self, id: &str) -> bool {
        self.nodes
            .remove_if(id, |_, node| node.state == MachineState::Pending)
            .is_some()
    }

    /// Schedule `node` for removal once the grace period has elapsed.
    ///
    /// The node stays in the primary map until then.
    pub fn on_terminated(&self, node: Node) {
        let expires_at = self.clock.now() + self.grace_period;
        debug!(node_id = %node.id, %expires_at, "Node scheduled for removal");
        self.terminated
            .lock()
            .push(Reverse(TerminatedNode { node, expires_at }));
    }

    /// Snapshot of every registered node.
    pub fn list(&self) -> Vec<Node> {
        self.vacuum();
        self.nodes.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn vacuum(&self) {
        let now_ms = self.clock.now().timestamp_millis();
        let last = self.last_vacuum_ms.load(AtomicOrdering::Relaxed);
        if now_ms.saturating_sub(last) < self.vacuum_interval_ms {
            return;
        }
        self.last_vacuum_ms.store(now_ms, AtomicOrdering::Relaxed);

        let mut removed = 0usize;
        let mut queue = self.terminated.lock();
        loop {
            // Expiry is checked against a fresh reading per head, like a delay queue poll.
            let expired = match queue.peek() {
                Some(Reverse(head)) => head.expires_at <= self.clock.now(),
                None => break,
            };
            if !expired {
                break;
            }
            if let Some(Reverse(entry)) = queue.pop() {
                self.nodes.remove(&entry.node.id);
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, pending = queue.len(), "Vacuumed terminated nodes");
        }
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
