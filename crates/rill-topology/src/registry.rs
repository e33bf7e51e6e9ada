//! Shared registry of store nodes and the current ring.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use rill_ring::Ring;
use rill_types::{NodeId, NodeRecord, NodeStatus, TopologyEvent, TopologyNode, TopologySnapshot};
use tokio::sync::{RwLock, broadcast};
use tracing::{info, warn};

/// Registry state guarded by a single lock, so topology replacement is
/// atomic from any reader's perspective: a reader sees the prior complete
/// membership or the new complete membership, never a mix.
struct Inner {
    /// Known nodes, keyed by ID. BTreeMap ordering is the "registry order"
    /// used for deterministic failover substitution.
    nodes: BTreeMap<NodeId, NodeRecord>,
    /// Current ring. Replaced wholesale, never mutated.
    ring: Arc<Ring>,
}

/// Shared registry of store nodes.
///
/// Holds the known membership, each node's health classification and the
/// consistent-hash ring, plus a broadcast channel for topology events.
/// All mutation goes through the health monitor; readers get clones.
pub struct NodeRegistry {
    inner: RwLock<Inner>,
    event_tx: broadcast::Sender<TopologyEvent>,
}

impl NodeRegistry {
    /// Create a registry seeded with an initial node list.
    ///
    /// Seed nodes start as [`NodeStatus::Unknown`] until their first probe;
    /// the ring is empty until the first discovery round.
    pub fn new(seeds: Vec<TopologyNode>) -> Arc<Self> {
        let nodes = seeds
            .into_iter()
            .map(|node| (node.id.clone(), NodeRecord::unknown(node)))
            .collect();
        let (event_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            inner: RwLock::new(Inner {
                nodes,
                ring: Arc::new(Ring::empty()),
            }),
            event_tx,
        })
    }

    /// Subscribe to topology events (health transitions, replacements).
    pub fn subscribe(&self) -> broadcast::Receiver<TopologyEvent> {
        self.event_tx.subscribe()
    }

    /// Snapshot of all known nodes, in registry order.
    pub async fn snapshot(&self) -> Vec<NodeRecord> {
        self.inner.read().await.nodes.values().cloned().collect()
    }

    /// Look up one node by ID.
    pub async fn get(&self, node_id: &NodeId) -> Option<NodeRecord> {
        self.inner.read().await.nodes.get(node_id).cloned()
    }

    /// Nodes currently classified [`NodeStatus::Active`], in registry order.
    ///
    /// An empty result is a valid (degraded) state, not an error; the
    /// dispatcher surfaces it as "no active node available".
    pub async fn active_nodes(&self) -> Vec<NodeRecord> {
        self.inner
            .read()
            .await
            .nodes
            .values()
            .filter(|r| r.is_active())
            .cloned()
            .collect()
    }

    /// The current ring.
    pub async fn ring(&self) -> Arc<Ring> {
        self.inner.read().await.ring.clone()
    }

    /// Number of known nodes.
    pub async fn len(&self) -> usize {
        self.inner.read().await.nodes.len()
    }

    /// Whether the registry knows no nodes at all.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.nodes.is_empty()
    }

    /// Number of active nodes.
    pub async fn active_count(&self) -> usize {
        self.inner
            .read()
            .await
            .nodes
            .values()
            .filter(|r| r.is_active())
            .count()
    }

    /// Record one probe outcome.
    ///
    /// Updates the node's status and probe timestamp, and its served
    /// topology when the probe learned it. Unknown node IDs are ignored
    /// (the node may have been removed by a concurrent discovery round).
    /// Called by the health monitor only.
    pub async fn apply_health_result(
        &self,
        node_id: &NodeId,
        healthy: bool,
        topology_id: Option<String>,
    ) {
        let event = {
            let mut inner = self.inner.write().await;
            let Some(record) = inner.nodes.get_mut(node_id) else {
                return;
            };

            let new_status = if healthy {
                NodeStatus::Active
            } else {
                NodeStatus::Inactive
            };
            let changed = record.status != new_status;
            record.status = new_status;
            record.last_checked = Some(SystemTime::now());
            if let Some(topology_id) = topology_id {
                record.topology_id = Some(topology_id);
            }

            match (changed, healthy) {
                (true, true) => Some(TopologyEvent::NodeActive(node_id.clone())),
                (true, false) => Some(TopologyEvent::NodeInactive(node_id.clone())),
                (false, _) => None,
            }
        };

        if let Some(event) = event {
            match &event {
                TopologyEvent::NodeActive(id) => info!(node_id = %id, "node is active"),
                TopologyEvent::NodeInactive(id) => info!(node_id = %id, "node is inactive"),
                TopologyEvent::TopologyReplaced { .. } => {}
            }
            let _ = self.event_tx.send(event);
        }
    }

    /// Atomically replace the full membership and ring.
    ///
    /// Nodes absent from the new topology are removed; new nodes enter as
    /// [`NodeStatus::Unknown`] pending their first probe; surviving nodes
    /// keep their health classification. Called by the discovery loop
    /// after a successful fetch — a failed fetch never reaches here, so
    /// it can never clear the registry as a side effect.
    pub async fn replace_topology(&self, snapshot: TopologySnapshot, ring: Ring) {
        if snapshot.nodes.is_empty() {
            warn!(
                topology_id = %snapshot.topology_id,
                "refusing to replace topology with an empty node list"
            );
            return;
        }

        let topology_id = snapshot.topology_id.clone();
        {
            let mut inner = self.inner.write().await;
            let mut nodes = BTreeMap::new();
            for node in snapshot.nodes {
                let record = match inner.nodes.get(&node.id) {
                    Some(old) => NodeRecord {
                        node,
                        topology_id: old.topology_id.clone(),
                        status: old.status,
                        last_checked: old.last_checked,
                    },
                    None => NodeRecord::unknown(node),
                };
                nodes.insert(record.node.id.clone(), record);
            }
            inner.nodes = nodes;
            inner.ring = Arc::new(ring);
        }

        info!(topology_id = %topology_id, "topology replaced");
        let _ = self
            .event_tx
            .send(TopologyEvent::TopologyReplaced { topology_id });
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry").finish_non_exhaustive()
    }
}
