//! Ring data structure and owner lookup.

use std::collections::BTreeSet;

use rill_types::{NodeId, RingDescriptor};
use tracing::debug;

/// Errors produced by ring lookups.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RingError {
    /// A lookup was attempted before any virtual nodes were loaded.
    #[error("ring has no virtual nodes")]
    EmptyRing,
}

/// Client-side copy of the cluster's consistent-hash ring.
///
/// Holds the virtual-node descriptors sorted by ring position, plus the
/// replication factor: the number of distinct physical nodes returned per
/// lookup.
#[derive(Debug, Clone, Default)]
pub struct Ring {
    /// Virtual nodes, sorted ascending by `location`.
    vnodes: Vec<RingDescriptor>,
    /// Distinct owning nodes to return per lookup.
    replication: usize,
    /// Number of distinct physical nodes on the ring.
    node_count: usize,
}

impl Ring {
    /// Build a ring from a fetched set of virtual-node descriptors.
    ///
    /// Sorts once by `location` (lookups binary-search the sorted order).
    /// The sort is stable, so descriptors with equal locations keep their
    /// load order.
    pub fn new(mut vnodes: Vec<RingDescriptor>, replication: usize) -> Self {
        vnodes.sort_by(|a, b| a.location.total_cmp(&b.location));
        let node_count = vnodes.iter().map(|v| &v.id).collect::<BTreeSet<_>>().len();
        debug!(
            vnodes = vnodes.len(),
            nodes = node_count,
            replication,
            "loaded ring"
        );
        Self {
            vnodes,
            replication,
            node_count,
        }
    }

    /// An empty ring (used before the first topology fetch).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Hash a key onto the ring.
    ///
    /// blake3 of the key, first 8 bytes as a little-endian u64, scaled into
    /// `[0, 1)` — the space the store advertises vnode locations in.
    /// Stable across client versions and platforms.
    pub fn key_location(key: &str) -> f64 {
        let hash = blake3::hash(key.as_bytes());
        let bytes: [u8; 8] = hash.as_bytes()[..8].try_into().expect("8 bytes");
        u64::from_le_bytes(bytes) as f64 / (u64::MAX as f64 + 1.0)
    }

    /// Determine which nodes own a key.
    ///
    /// Returns between 1 and `replication` descriptors with distinct node
    /// IDs; fewer than `replication` when the ring has fewer distinct
    /// nodes.
    pub fn locate(&self, key: &str) -> Result<Vec<&RingDescriptor>, RingError> {
        self.locate_at(Self::key_location(key))
    }

    /// Owner lookup at an explicit ring position.
    ///
    /// Binary-searches for the first descriptor with `location >= target`,
    /// wrapping to the start of the ring when the target exceeds every
    /// location, then walks forward (wrapping) collecting descriptors with
    /// distinct node IDs.
    pub fn locate_at(&self, location: f64) -> Result<Vec<&RingDescriptor>, RingError> {
        if self.vnodes.is_empty() {
            return Err(RingError::EmptyRing);
        }

        let wanted = self.replication.max(1).min(self.node_count);
        let start = self.vnodes.partition_point(|v| v.location < location);

        let mut owners: Vec<&RingDescriptor> = Vec::with_capacity(wanted);
        for i in 0..self.vnodes.len() {
            let vnode = &self.vnodes[(start + i) % self.vnodes.len()];
            if !owners.iter().any(|o| o.id == vnode.id) {
                owners.push(vnode);
                if owners.len() == wanted {
                    break;
                }
            }
        }

        Ok(owners)
    }

    /// Node IDs owning a key, in ring order.
    pub fn owner_ids(&self, key: &str) -> Result<Vec<NodeId>, RingError> {
        Ok(self.locate(key)?.into_iter().map(|v| v.id.clone()).collect())
    }

    /// Whether the ring has any virtual nodes.
    pub fn is_empty(&self) -> bool {
        self.vnodes.is_empty()
    }

    /// Number of virtual nodes on the ring.
    pub fn vnode_count(&self) -> usize {
        self.vnodes.len()
    }

    /// Number of distinct physical nodes on the ring.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// The configured replication factor.
    pub fn replication(&self) -> usize {
        self.replication
    }
}
