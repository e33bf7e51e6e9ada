//! Background health probing and topology discovery.
//!
//! Two independent cadences keep the [`NodeRegistry`] fresh:
//!
//! - **Probe loop** — every `probe_interval`, probe all known nodes
//!   concurrently (bounded) against their `/state` endpoint, applying each
//!   result to the registry as it arrives.
//! - **Discovery loop** — every `discovery_interval` (when enabled), fetch
//!   the topology and ring documents from the first node that answers and
//!   atomically replace the registry's membership.
//!
//! Probe and discovery failures never propagate to callers; they only
//! affect registry state and are logged for observability.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rill_net::{NetError, RequestContext, Transport};
use rill_ring::Ring;
use rill_types::{NodeId, NodeRecord, NodeState, TopologySnapshot};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::registry::NodeRegistry;

/// Configuration for the health monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between probe rounds.
    pub probe_interval: Duration,
    /// Per-probe timeout. Kept shorter than the dispatcher's request
    /// timeout so a slow node is reclassified quickly.
    pub probe_timeout: Duration,
    /// Maximum concurrent probes per round.
    pub probe_concurrency: usize,
    /// Interval between discovery rounds.
    pub discovery_interval: Duration,
    /// Timeout covering one discovery fetch (state + topology + ring).
    pub discovery_timeout: Duration,
    /// Whether the discovery loop runs at all.
    pub discover: bool,
    /// Ring replication factor used when the topology document does not
    /// advertise one.
    pub replication: usize,
}

impl MonitorConfig {
    /// Create a default config for production use.
    pub fn default_config() -> Self {
        Self {
            probe_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_millis(500),
            probe_concurrency: 8,
            discovery_interval: Duration::from_secs(30),
            discovery_timeout: Duration::from_secs(5),
            discover: true,
            replication: 2,
        }
    }

    /// Create a config suitable for fast test execution.
    pub fn test_config() -> Self {
        Self {
            probe_interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(100),
            probe_concurrency: 4,
            discovery_interval: Duration::from_millis(50),
            discovery_timeout: Duration::from_millis(200),
            discover: true,
            replication: 2,
        }
    }
}

/// The background monitor shared by the probe and discovery tasks.
#[derive(Clone)]
struct HealthMonitor {
    config: MonitorConfig,
    registry: Arc<NodeRegistry>,
    transport: Arc<dyn Transport>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl HealthMonitor {
    /// Run the probe loop until shutdown.
    async fn run_probes(&self) {
        info!("probe loop started");

        let mut interval = tokio::time::interval(self.config.probe_interval);
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.probe_round().await;
                }
                _ = shutdown_rx.changed() => {
                    info!("probe loop shutting down");
                    break;
                }
            }
        }
    }

    /// Probe every known node, bounded-concurrently.
    ///
    /// Each probe has its own timeout; results are applied to the registry
    /// as they complete, so one slow node cannot delay the others'
    /// reclassification.
    async fn probe_round(&self) {
        let nodes = self.registry.snapshot().await;
        if nodes.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.probe_concurrency.max(1)));
        let mut probes: JoinSet<(NodeId, Result<NodeState, NetError>)> = JoinSet::new();

        for record in nodes {
            let semaphore = semaphore.clone();
            let transport = self.transport.clone();
            let timeout = self.config.probe_timeout;
            probes.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("probe semaphore is never closed");
                let ctx = RequestContext::with_timeout(timeout);
                let result = transport.node_state(&record.node, &ctx).await;
                (record.node.id.clone(), result)
            });
        }

        while let Some(joined) = probes.join_next().await {
            let Ok((node_id, outcome)) = joined else {
                continue;
            };
            match outcome {
                Ok(state) => {
                    self.registry
                        .apply_health_result(&node_id, true, Some(state.current))
                        .await;
                }
                Err(e) => {
                    debug!(node_id = %node_id, %e, "probe failed");
                    self.registry.apply_health_result(&node_id, false, None).await;
                }
            }
        }
    }

    /// Run the discovery loop until shutdown.
    async fn run_discovery(&self) {
        info!("discovery loop started");

        let mut interval = tokio::time::interval(self.config.discovery_interval);
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.discovery_round().await;
                }
                _ = shutdown_rx.changed() => {
                    info!("discovery loop shutting down");
                    break;
                }
            }
        }
    }

    /// Refresh the topology from the first node that answers.
    ///
    /// Active nodes are tried first, the rest as fallback. A round where
    /// no node answers is skipped; the previous registry state is kept.
    async fn discovery_round(&self) {
        let mut candidates = self.registry.active_nodes().await;
        let active: HashSet<NodeId> = candidates.iter().map(|r| r.node.id.clone()).collect();
        for record in self.registry.snapshot().await {
            if !active.contains(&record.node.id) {
                candidates.push(record);
            }
        }

        for record in candidates {
            match self.fetch_topology(&record).await {
                Ok((snapshot, ring)) => {
                    self.registry.replace_topology(snapshot, ring).await;
                    return;
                }
                Err(e) => {
                    debug!(node_id = %record.node.id, %e, "discovery fetch failed");
                }
            }
        }

        warn!("discovery round skipped: no node answered; keeping previous topology");
    }

    /// Fetch the topology and ring documents via one node.
    async fn fetch_topology(&self, record: &NodeRecord) -> Result<(TopologySnapshot, Ring), NetError> {
        let ctx = RequestContext::with_timeout(self.config.discovery_timeout);

        let state = self.transport.node_state(&record.node, &ctx).await?;
        let snapshot = self.transport.topology(&record.node, &state.current, &ctx).await?;
        let vnodes = self
            .transport
            .topo_ring(&record.node, &state.current, &ctx)
            .await?;

        let replication = if snapshot.replication > 0 {
            snapshot.replication as usize
        } else {
            self.config.replication
        };

        Ok((snapshot, Ring::new(vnodes, replication)))
    }
}

/// Handle to the running monitor tasks.
///
/// Dropping the handle does not stop the tasks; call [`MonitorHandle::stop`]
/// for a graceful shutdown or [`MonitorHandle::abort`] to kill them.
pub struct MonitorHandle {
    registry: Arc<NodeRegistry>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    probe_task: tokio::task::JoinHandle<()>,
    discovery_task: Option<tokio::task::JoinHandle<()>>,
}

impl MonitorHandle {
    /// The registry this monitor maintains.
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Signal both loops to stop after their current round.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Abort the background tasks.
    pub fn abort(&self) {
        self.probe_task.abort();
        if let Some(task) = &self.discovery_task {
            task.abort();
        }
    }

    /// Whether the probe loop is still running.
    pub fn is_running(&self) -> bool {
        !self.probe_task.is_finished()
    }
}

/// Start the health monitor and return a handle.
///
/// Spawns the probe task, and the discovery task when discovery is
/// enabled. Both loops fire immediately on start, so a freshly seeded
/// registry gets its first classification without waiting a full interval.
pub fn start(
    registry: Arc<NodeRegistry>,
    transport: Arc<dyn Transport>,
    config: MonitorConfig,
) -> MonitorHandle {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let monitor = HealthMonitor {
        config: config.clone(),
        registry: registry.clone(),
        transport,
        shutdown_rx,
    };

    let prober = monitor.clone();
    let probe_task = tokio::spawn(async move {
        prober.run_probes().await;
    });

    let discovery_task = config.discover.then(|| {
        tokio::spawn(async move {
            monitor.run_discovery().await;
        })
    });

    MonitorHandle {
        registry,
        shutdown_tx,
        probe_task,
        discovery_task,
    }
}
