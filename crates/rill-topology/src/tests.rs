//! Tests for the registry and the health monitor.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use rill_net::{NetError, RequestContext, Response, Transport};
use rill_ring::Ring;
use rill_types::{
    NodeId, NodeState, NodeStatus, RingDescriptor, TopologyEvent, TopologyNode, TopologySnapshot,
};

use crate::monitor::{self, MonitorConfig};
use crate::registry::NodeRegistry;

/// Transport double with per-node probe outcomes and an optional topology
/// to serve to discovery.
#[derive(Default)]
struct MockTransport {
    healthy: Mutex<HashSet<NodeId>>,
    topology: Mutex<Option<(TopologySnapshot, Vec<RingDescriptor>)>>,
}

impl MockTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn set_healthy(&self, id: &NodeId, healthy: bool) {
        let mut set = self.healthy.lock().unwrap();
        if healthy {
            set.insert(id.clone());
        } else {
            set.remove(id);
        }
    }

    fn serve_topology(&self, snapshot: TopologySnapshot, vnodes: Vec<RingDescriptor>) {
        *self.topology.lock().unwrap() = Some((snapshot, vnodes));
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn perform(
        &self,
        _node: &TopologyNode,
        _method: &str,
        _path: &str,
        _body: Option<Bytes>,
        _headers: &[(String, String)],
        _ctx: &RequestContext,
    ) -> Result<Response, NetError> {
        Err(NetError::Connect("not wired in this test".into()))
    }

    async fn node_state(
        &self,
        node: &TopologyNode,
        _ctx: &RequestContext,
    ) -> Result<NodeState, NetError> {
        if !self.healthy.lock().unwrap().contains(&node.id) {
            return Err(NetError::Connect("connection refused".into()));
        }
        let current = self
            .topology
            .lock()
            .unwrap()
            .as_ref()
            .map(|(s, _)| s.topology_id.clone())
            .unwrap_or_else(|| "t0".to_string());
        Ok(NodeState {
            identity: node.id.clone(),
            current,
            next: None,
        })
    }

    async fn topology(
        &self,
        _node: &TopologyNode,
        topology_id: &str,
        _ctx: &RequestContext,
    ) -> Result<TopologySnapshot, NetError> {
        match self.topology.lock().unwrap().as_ref() {
            Some((snapshot, _)) if snapshot.topology_id == topology_id => Ok(snapshot.clone()),
            _ => Err(NetError::Status {
                code: 404,
                body: "unknown topology".into(),
            }),
        }
    }

    async fn topo_ring(
        &self,
        _node: &TopologyNode,
        _topology_id: &str,
        _ctx: &RequestContext,
    ) -> Result<Vec<RingDescriptor>, NetError> {
        match self.topology.lock().unwrap().as_ref() {
            Some((_, vnodes)) => Ok(vnodes.clone()),
            None => Err(NetError::Status {
                code: 404,
                body: "unknown topology".into(),
            }),
        }
    }
}

fn test_node(id: &str, address: &str) -> TopologyNode {
    TopologyNode {
        id: NodeId::from(id),
        address: address.to_string(),
        port: 8112,
        api_port: 8112,
        weight: 32,
        n: 2,
    }
}

fn test_vnodes(ids: &[&str]) -> Vec<RingDescriptor> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| RingDescriptor {
            id: NodeId::from(*id),
            idx: 0,
            location: (i as f64 + 1.0) / (ids.len() as f64 + 1.0),
        })
        .collect()
}

/// Poll `condition` until it holds or two seconds elapse.
async fn wait_for<F, Fut>(condition: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if condition().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within deadline");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn probe_only_config() -> MonitorConfig {
    MonitorConfig {
        discover: false,
        ..MonitorConfig::test_config()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_seeds_start_unknown_with_empty_ring() {
    let registry = NodeRegistry::new(vec![test_node("n1", "10.0.0.1"), test_node("n2", "10.0.0.2")]);
    let snapshot = registry.snapshot().await;
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.iter().all(|r| r.status == NodeStatus::Unknown));
    assert!(registry.active_nodes().await.is_empty());
    assert!(registry.ring().await.is_empty());
}

#[tokio::test]
async fn test_apply_health_result_transitions_and_events() {
    let registry = NodeRegistry::new(vec![test_node("n1", "10.0.0.1")]);
    let mut events = registry.subscribe();
    let id = NodeId::from("n1");

    registry.apply_health_result(&id, true, Some("t1".into())).await;
    let record = registry.get(&id).await.unwrap();
    assert_eq!(record.status, NodeStatus::Active);
    assert_eq!(record.topology_id.as_deref(), Some("t1"));
    assert!(record.last_checked.is_some());
    assert_eq!(events.recv().await.unwrap(), TopologyEvent::NodeActive(id.clone()));

    // Repeat result with the same outcome: no event.
    registry.apply_health_result(&id, true, None).await;
    registry.apply_health_result(&id, false, None).await;
    assert_eq!(events.recv().await.unwrap(), TopologyEvent::NodeInactive(id.clone()));
    assert_eq!(registry.active_count().await, 0);
}

#[tokio::test]
async fn test_apply_health_result_ignores_unknown_node() {
    let registry = NodeRegistry::new(vec![test_node("n1", "10.0.0.1")]);
    registry
        .apply_health_result(&NodeId::from("ghost"), true, None)
        .await;
    assert_eq!(registry.len().await, 1);
    assert!(registry.get(&NodeId::from("ghost")).await.is_none());
}

#[tokio::test]
async fn test_replace_topology_preserves_surviving_status() {
    let registry = NodeRegistry::new(vec![test_node("n1", "10.0.0.1"), test_node("n2", "10.0.0.2")]);
    registry
        .apply_health_result(&NodeId::from("n1"), true, Some("t1".into()))
        .await;

    // n2 dropped, n3 added; n1 survives.
    let snapshot = TopologySnapshot::from_nodes(
        "t2",
        vec![test_node("n1", "10.0.0.1"), test_node("n3", "10.0.0.3")],
    );
    let ring = Ring::new(test_vnodes(&["n1", "n3"]), 2);
    registry.replace_topology(snapshot, ring).await;

    let n1 = registry.get(&NodeId::from("n1")).await.unwrap();
    assert_eq!(n1.status, NodeStatus::Active);
    assert!(n1.last_checked.is_some());
    let n3 = registry.get(&NodeId::from("n3")).await.unwrap();
    assert_eq!(n3.status, NodeStatus::Unknown);
    assert!(registry.get(&NodeId::from("n2")).await.is_none());
    assert!(!registry.ring().await.is_empty());
}

#[tokio::test]
async fn test_replace_topology_refuses_empty_node_list() {
    let registry = NodeRegistry::new(vec![test_node("n1", "10.0.0.1")]);
    registry
        .replace_topology(TopologySnapshot::from_nodes("t9", Vec::new()), Ring::empty())
        .await;
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_replace_topology_emits_event() {
    let registry = NodeRegistry::new(Vec::new());
    let mut events = registry.subscribe();
    let snapshot = TopologySnapshot::from_nodes("t1", vec![test_node("n1", "10.0.0.1")]);
    registry
        .replace_topology(snapshot, Ring::new(test_vnodes(&["n1"]), 1))
        .await;
    assert_eq!(
        events.recv().await.unwrap(),
        TopologyEvent::TopologyReplaced {
            topology_id: "t1".to_string()
        }
    );
}

#[tokio::test]
async fn test_snapshot_is_a_copy() {
    let registry = NodeRegistry::new(vec![test_node("n1", "10.0.0.1")]);
    let before = registry.snapshot().await;
    registry
        .apply_health_result(&NodeId::from("n1"), true, None)
        .await;
    assert_eq!(before[0].status, NodeStatus::Unknown);
    assert_eq!(registry.snapshot().await[0].status, NodeStatus::Active);
}

#[tokio::test]
async fn test_replace_topology_atomic_under_concurrent_reads() {
    // Alternate between two disjoint memberships while a reader samples
    // snapshots; every observed set must belong entirely to one of them.
    let registry = NodeRegistry::new(vec![test_node("a1", "10.0.1.1"), test_node("a2", "10.0.1.2")]);
    let set_a: HashSet<NodeId> = ["a1", "a2"].iter().map(|s| NodeId::from(*s)).collect();
    let set_b: HashSet<NodeId> = ["b1", "b2"].iter().map(|s| NodeId::from(*s)).collect();

    let reader_registry = registry.clone();
    let (reader_a, reader_b) = (set_a.clone(), set_b.clone());
    let reader = tokio::spawn(async move {
        for _ in 0..1_000 {
            let ids: HashSet<NodeId> = reader_registry
                .snapshot()
                .await
                .iter()
                .map(|r| r.node.id.clone())
                .collect();
            let all_a = ids.iter().all(|id| reader_a.contains(id));
            let all_b = ids.iter().all(|id| reader_b.contains(id));
            assert!(all_a || all_b, "observed mixed membership: {ids:?}");
            tokio::task::yield_now().await;
        }
    });

    for round in 0..200u32 {
        let (ids, topology_id): (&[&str], &str) = if round % 2 == 0 {
            (&["b1", "b2"], "tb")
        } else {
            (&["a1", "a2"], "ta")
        };
        let nodes = ids.iter().map(|id| test_node(id, "10.0.2.1")).collect();
        registry
            .replace_topology(
                TopologySnapshot::from_nodes(topology_id, nodes),
                Ring::new(test_vnodes(ids), 2),
            )
            .await;
        tokio::task::yield_now().await;
    }

    reader.await.unwrap();
}

// ---------------------------------------------------------------------------
// Health monitor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_probe_classifies_seed_nodes() {
    let transport = MockTransport::new();
    transport.set_healthy(&NodeId::from("n1"), true);

    let registry = NodeRegistry::new(vec![test_node("n1", "10.0.0.1"), test_node("n2", "10.0.0.2")]);
    let handle = monitor::start(registry.clone(), transport.clone(), probe_only_config());

    wait_for(|| async {
        let n1 = registry.get(&NodeId::from("n1")).await.unwrap();
        let n2 = registry.get(&NodeId::from("n2")).await.unwrap();
        n1.status == NodeStatus::Active && n2.status == NodeStatus::Inactive
    })
    .await;

    handle.stop();
}

#[tokio::test]
async fn test_probe_recovers_node_after_it_comes_back() {
    let transport = MockTransport::new();
    let registry = NodeRegistry::new(vec![test_node("n1", "10.0.0.1")]);
    let handle = monitor::start(registry.clone(), transport.clone(), probe_only_config());

    let id = NodeId::from("n1");
    wait_for(|| async { registry.get(&id).await.unwrap().status == NodeStatus::Inactive }).await;

    transport.set_healthy(&id, true);
    wait_for(|| async { registry.get(&id).await.unwrap().status == NodeStatus::Active }).await;

    handle.stop();
}

#[tokio::test]
async fn test_all_probes_failing_keeps_membership() {
    // A cluster-wide outage empties the active set but never the registry.
    let transport = MockTransport::new();
    let registry = NodeRegistry::new(vec![test_node("n1", "10.0.0.1"), test_node("n2", "10.0.0.2")]);
    let handle = monitor::start(registry.clone(), transport, probe_only_config());

    wait_for(|| async {
        registry
            .snapshot()
            .await
            .iter()
            .all(|r| r.status == NodeStatus::Inactive)
    })
    .await;

    assert_eq!(registry.len().await, 2);
    assert!(registry.active_nodes().await.is_empty());
    handle.stop();
}

#[tokio::test]
async fn test_discovery_replaces_membership_and_ring() {
    let transport = MockTransport::new();
    let seed = test_node("n1", "10.0.0.1");
    transport.set_healthy(&seed.id, true);
    transport.serve_topology(
        TopologySnapshot::from_nodes(
            "t1",
            vec![test_node("n1", "10.0.0.1"), test_node("n2", "10.0.0.2")],
        ),
        test_vnodes(&["n1", "n2"]),
    );

    let registry = NodeRegistry::new(vec![seed]);
    let handle = monitor::start(registry.clone(), transport, MonitorConfig::test_config());

    wait_for(|| async { registry.len().await == 2 }).await;
    assert!(!registry.ring().await.is_empty());
    assert!(registry.get(&NodeId::from("n2")).await.is_some());
    // The seed node's classification survived the replacement.
    wait_for(|| async { registry.get(&NodeId::from("n1")).await.unwrap().is_active() }).await;

    handle.stop();
}

#[tokio::test]
async fn test_discovery_failure_keeps_previous_registry() {
    // No topology is being served, so every discovery round fails; the
    // seeded membership must survive untouched.
    let transport = MockTransport::new();
    transport.set_healthy(&NodeId::from("n1"), true);

    let registry = NodeRegistry::new(vec![test_node("n1", "10.0.0.1")]);
    let handle = monitor::start(registry.clone(), transport, MonitorConfig::test_config());

    wait_for(|| async { registry.get(&NodeId::from("n1")).await.unwrap().is_active() }).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(registry.len().await, 1);
    assert!(registry.ring().await.is_empty());

    handle.stop();
}

#[tokio::test]
async fn test_monitor_stop_ends_loops() {
    let transport = MockTransport::new();
    let registry = NodeRegistry::new(vec![test_node("n1", "10.0.0.1")]);
    let handle = monitor::start(registry, transport, MonitorConfig::test_config());

    assert!(handle.is_running());
    handle.stop();
    wait_for(|| async { !handle.is_running() }).await;
}
