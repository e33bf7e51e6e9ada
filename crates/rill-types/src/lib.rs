//! Shared types for the rill client.
//!
//! This crate defines the types used across the rill workspace:
//! the node identifier ([`NodeId`]), the wire documents served by store
//! nodes ([`TopologyNode`], [`TopologySnapshot`], [`RingDescriptor`],
//! [`NodeState`]), the registry record ([`NodeRecord`], [`NodeStatus`]),
//! and the topology event stream ([`TopologyEvent`]).

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Node identity
// ---------------------------------------------------------------------------

/// Identifier for a store node.
///
/// Nodes advertise UUID strings in the topology document. Seed nodes known
/// only by address (before the first discovery round) carry their endpoint
/// string as a provisional ID; discovery replaces them with the real one.
#[derive(Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Wire documents
// ---------------------------------------------------------------------------

/// One entry of the cluster topology document.
///
/// Field names follow the JSON the store serves: `apiport` is the port the
/// client talks to, `n` is the write-replication count the topology was
/// built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyNode {
    /// Node UUID.
    pub id: NodeId,
    /// Host address (IP or DNS name).
    pub address: String,
    /// Inter-node port.
    pub port: u16,
    /// Client API port.
    #[serde(rename = "apiport")]
    pub api_port: u16,
    /// Ring weight (number of virtual nodes this node owns).
    pub weight: u32,
    /// Replication count advertised with this topology.
    #[serde(default)]
    pub n: u8,
}

/// The authoritative cluster membership document.
///
/// Fetched from any node; `topology_id` is the hash the cluster addresses
/// this snapshot by. Replaced wholesale on refresh, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologySnapshot {
    /// Hash identifying this topology.
    pub topology_id: String,
    /// All nodes participating in this topology.
    pub nodes: Vec<TopologyNode>,
    /// Number of distinct nodes that own each key.
    pub replication: u8,
}

impl TopologySnapshot {
    /// Build a snapshot from a decoded topology document.
    ///
    /// The per-node `n` values are expected to agree; the largest one wins
    /// if they do not (a rolling topology change can briefly disagree).
    pub fn from_nodes(topology_id: impl Into<String>, nodes: Vec<TopologyNode>) -> Self {
        let replication = nodes.iter().map(|n| n.n).max().unwrap_or(0);
        Self {
            topology_id: topology_id.into(),
            nodes,
            replication,
        }
    }
}

/// One virtual node of the consistent-hash ring document.
///
/// `location` is the vnode's position on the unit ring; `idx` distinguishes
/// the virtual nodes of one physical node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingDescriptor {
    /// Owning node UUID.
    pub id: NodeId,
    /// Virtual node index within the owning node.
    pub idx: u32,
    /// Position on the ring, in `[0, 1)`.
    pub location: f64,
}

/// Subset of a node's `/state` document.
///
/// `current` is the topology this node is presently serving; `next` is set
/// while a topology change is being rolled out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    /// The node's own UUID.
    pub identity: NodeId,
    /// Topology hash the node is serving.
    pub current: String,
    /// Topology hash the node is migrating to, if any.
    #[serde(default)]
    pub next: Option<String>,
}

// ---------------------------------------------------------------------------
// Registry types
// ---------------------------------------------------------------------------

/// Health classification of a store node.
///
/// Transitions happen only through the health monitor: `Unknown` on first
/// sight, then `Active`/`Inactive` per probe results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Not probed yet.
    Unknown,
    /// Last probe succeeded; eligible for routing.
    Active,
    /// Last probe failed or timed out.
    Inactive,
}

/// A node as tracked by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    /// The node's topology entry (identity, endpoint, weight).
    pub node: TopologyNode,
    /// Topology the node reported it is serving, once known.
    pub topology_id: Option<String>,
    /// Current health classification.
    pub status: NodeStatus,
    /// When the node was last probed.
    pub last_checked: Option<SystemTime>,
}

impl NodeRecord {
    /// Create a record for a node that has not been probed yet.
    pub fn unknown(node: TopologyNode) -> Self {
        Self {
            node,
            topology_id: None,
            status: NodeStatus::Unknown,
            last_checked: None,
        }
    }

    /// The node's identifier.
    pub fn node_id(&self) -> &NodeId {
        &self.node.id
    }

    /// Whether the node is eligible for routing.
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }
}

/// Events broadcast by the registry as the health monitor updates it.
#[derive(Debug, Clone, PartialEq)]
pub enum TopologyEvent {
    /// A node transitioned to [`NodeStatus::Active`].
    NodeActive(NodeId),
    /// A node transitioned to [`NodeStatus::Inactive`].
    NodeInactive(NodeId),
    /// Discovery replaced the full membership and ring.
    TopologyReplaced {
        /// Hash of the new topology.
        topology_id: String,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
