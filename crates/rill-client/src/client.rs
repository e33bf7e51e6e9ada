//! The cluster-aware client and its dispatcher.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use rill_net::{HttpTransport, NetError, RequestContext, Response, Transport, decode_json};
use rill_topology::{MonitorHandle, NodeRegistry, monitor};
use rill_types::{
    NodeId, NodeState, NodeStatus, RingDescriptor, TopologyEvent, TopologyNode, TopologySnapshot,
};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Where a request should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Exactly this node; no failover to other nodes.
    Node(NodeId),
    /// The nodes owning this key per the ring, preferred in ring order.
    Key(String),
    /// Any active node; successive requests rotate through them.
    AnyActive,
}

/// Client for a rill store cluster.
///
/// Owns the node registry, the background health monitor and the transport.
/// All requests go through [`RillClient::execute`], which picks candidate
/// nodes for the [`Target`] and applies the retry policy.
pub struct RillClient {
    registry: Arc<NodeRegistry>,
    transport: Arc<dyn Transport>,
    monitor: Option<MonitorHandle>,
    request_timeout: Duration,
    retries: usize,
    cursor: AtomicUsize,
}

impl RillClient {
    /// Connect to a cluster over HTTP.
    ///
    /// Seeds the registry from the configured endpoints and starts the
    /// health monitor; returns immediately, before the first probe round.
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        Self::with_transport(config, transport)
    }

    /// Connect using a caller-supplied transport.
    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let registry = NodeRegistry::new(config.seed_nodes()?);
        let monitor = monitor::start(registry.clone(), transport.clone(), config.monitor_config());
        Ok(Self {
            registry,
            transport,
            monitor: Some(monitor),
            request_timeout: config.request_timeout(),
            retries: config.retries,
            cursor: AtomicUsize::new(0),
        })
    }

    /// A client whose registry is driven by the caller instead of a
    /// monitor. Dispatcher tests use this for deterministic health state.
    #[cfg(test)]
    pub(crate) fn without_monitor(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            registry: NodeRegistry::new(config.seed_nodes()?),
            transport,
            monitor: None,
            request_timeout: config.request_timeout(),
            retries: config.retries,
            cursor: AtomicUsize::new(0),
        })
    }

    /// The shared node registry.
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Subscribe to topology events (health transitions, replacements).
    pub fn subscribe(&self) -> broadcast::Receiver<TopologyEvent> {
        self.registry.subscribe()
    }

    /// Stop the background monitor. In-flight requests are unaffected.
    pub fn shutdown(&self) {
        if let Some(monitor) = &self.monitor {
            monitor.stop();
        }
    }

    /// Resolve a target into an ordered candidate list.
    ///
    /// Explicit-node targeting yields exactly one candidate. Key-based
    /// targeting yields the ring owners in ring order, minus owners known
    /// to be inactive, then the remaining active nodes in registry order
    /// as failover. Any-active targeting
    /// yields the active set rotated by a request counter, spreading
    /// un-keyed load.
    async fn candidates(&self, target: &Target) -> Result<Vec<TopologyNode>, ClientError> {
        match target {
            Target::Node(id) => {
                let record = self
                    .registry
                    .get(id)
                    .await
                    .ok_or_else(|| ClientError::NodeNotFound(id.clone()))?;
                Ok(vec![record.node])
            }
            Target::Key(key) => {
                let ring = self.registry.ring().await;
                let owners = ring.owner_ids(key)?;

                // Owners known to be down are skipped up front; ring
                // freshness lags real-time health, so active non-owners
                // stand in for them.
                let mut seen = HashSet::new();
                let mut nodes = Vec::new();
                for id in owners {
                    if let Some(record) = self.registry.get(&id).await {
                        seen.insert(id);
                        if record.status != NodeStatus::Inactive {
                            nodes.push(record.node);
                        }
                    }
                }
                for record in self.registry.active_nodes().await {
                    if !seen.contains(&record.node.id) {
                        nodes.push(record.node);
                    }
                }
                if nodes.is_empty() {
                    return Err(ClientError::NoActiveNode);
                }
                Ok(nodes)
            }
            Target::AnyActive => {
                let active = self.registry.active_nodes().await;
                if active.is_empty() {
                    return Err(ClientError::NoActiveNode);
                }
                let start = self.cursor.fetch_add(1, Ordering::Relaxed) % active.len();
                Ok((0..active.len())
                    .map(|i| active[(start + i) % active.len()].node.clone())
                    .collect())
            }
        }
    }

    /// Dispatch one request.
    ///
    /// Makes up to `retries + 1` attempts, each under its own request
    /// timeout derived from `ctx`. Transient failures move on to the next
    /// candidate (wrapping). An explicit-node target gets exactly one
    /// attempt: the caller chose the node, so its failure surfaces as-is.
    /// Non-retryable failures and cancellation return immediately.
    pub async fn execute(
        &self,
        target: Target,
        method: &str,
        path: &str,
        body: Option<Bytes>,
        headers: &[(String, String)],
        ctx: &RequestContext,
    ) -> Result<Response, ClientError> {
        let candidates = self.candidates(&target).await?;
        let attempts = match &target {
            Target::Node(_) => 1,
            Target::Key(_) | Target::AnyActive => self.retries + 1,
        };
        let mut last: Option<NetError> = None;

        for attempt in 0..attempts {
            if ctx.is_cancelled() {
                return Err(NetError::Cancelled.into());
            }
            let node = &candidates[attempt % candidates.len()];
            let attempt_ctx = ctx.child(Some(self.request_timeout));

            match self
                .transport
                .perform(node, method, path, body.clone(), headers, &attempt_ctx)
                .await
            {
                Ok(response) => return Ok(response),
                Err(NetError::Cancelled) => return Err(NetError::Cancelled.into()),
                Err(e) if !e.is_retryable() => return Err(e.into()),
                Err(e) => {
                    debug!(node = %node.id, attempt, %e, "attempt failed");
                    last = Some(e);
                }
            }
        }

        Err(last.map(ClientError::from).unwrap_or(ClientError::NoActiveNode))
    }

    /// GET a path and decode the JSON response body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        target: Target,
        path: &str,
        ctx: &RequestContext,
    ) -> Result<T, ClientError> {
        let response = self.execute(target, "GET", path, None, &[], ctx).await?;
        Ok(decode_json(&response.body)?)
    }
}

/// Topology inspection and administration.
impl RillClient {
    /// Fetch one node's `/state` document.
    pub async fn node_state(
        &self,
        node_id: &NodeId,
        ctx: &RequestContext,
    ) -> Result<NodeState, ClientError> {
        self.get_json(Target::Node(node_id.clone()), "/state", ctx).await
    }

    /// Fetch the membership document for a topology hash.
    pub async fn topology_info(
        &self,
        topology_id: &str,
        ctx: &RequestContext,
    ) -> Result<TopologySnapshot, ClientError> {
        let path = format!("/topology/json/{topology_id}");
        let nodes: Vec<TopologyNode> = self.get_json(Target::AnyActive, &path, ctx).await?;
        Ok(TopologySnapshot::from_nodes(topology_id, nodes))
    }

    /// Fetch the virtual-node list for a topology hash.
    pub async fn topo_ring_info(
        &self,
        topology_id: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<RingDescriptor>, ClientError> {
        let path = format!("/toporing/json/{topology_id}");
        self.get_json(Target::AnyActive, &path, ctx).await
    }

    /// Upload a new topology under the given hash.
    ///
    /// The cluster does not serve from it until it is activated.
    pub async fn load_topology(
        &self,
        topology_id: &str,
        nodes: &[TopologyNode],
        ctx: &RequestContext,
    ) -> Result<(), ClientError> {
        let body = serde_json::to_vec(nodes).map_err(|e| ClientError::Encode(e.to_string()))?;
        let headers = [("content-type".to_string(), "application/json".to_string())];
        let path = format!("/topology/{topology_id}");
        self.execute(
            Target::AnyActive,
            "POST",
            &path,
            Some(Bytes::from(body)),
            &headers,
            ctx,
        )
        .await?;
        Ok(())
    }

    /// Activate a previously loaded topology.
    pub async fn activate_topology(
        &self,
        topology_id: &str,
        ctx: &RequestContext,
    ) -> Result<(), ClientError> {
        let path = format!("/activate/{topology_id}");
        self.execute(Target::AnyActive, "GET", &path, None, &[], ctx)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for RillClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RillClient")
            .field("retries", &self.retries)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
