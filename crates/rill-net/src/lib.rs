//! Network transport for the rill client.
//!
//! This crate defines the seam between the routing core and the wire:
//!
//! - [`Transport`] — the trait the dispatcher and health monitor talk to.
//! - [`HttpTransport`] — the reqwest-backed implementation.
//! - [`RequestContext`] — per-call cancellation token plus deadline.
//! - [`NetError`] — transport error taxonomy with retryability.
//!
//! The core never builds wire-format bodies itself; it hands opaque bytes
//! to [`Transport::perform`] and decodes responses with [`decode_json`].

mod context;
mod error;
mod http;

use std::collections::HashMap;

use bytes::Bytes;
use rill_types::{NodeState, RingDescriptor, TopologyNode, TopologySnapshot};
use serde::de::DeserializeOwned;

pub use context::RequestContext;
pub use error::NetError;
pub use http::HttpTransport;

/// A decoded transport response: status, headers, raw body.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, keys lowercased.
    pub headers: HashMap<String, String>,
    /// Raw response body.
    pub body: Bytes,
}

impl Response {
    /// Look up a header value, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Trait abstracting the network operations used by the routing core.
///
/// This allows substituting a mock transport in tests (avoiding the need
/// for live store nodes and network access).
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Perform a generic request against one node.
    ///
    /// `path` may carry a query string; `body` is passed through opaque.
    async fn perform(
        &self,
        node: &TopologyNode,
        method: &str,
        path: &str,
        body: Option<Bytes>,
        headers: &[(String, String)],
        ctx: &RequestContext,
    ) -> Result<Response, NetError>;

    /// Fetch a node's `/state` document.
    ///
    /// Doubles as the health probe: a node that answers within the probe
    /// timeout is healthy, and the document names the topology it serves.
    async fn node_state(
        &self,
        node: &TopologyNode,
        ctx: &RequestContext,
    ) -> Result<NodeState, NetError>;

    /// Fetch the topology document for a topology hash.
    async fn topology(
        &self,
        node: &TopologyNode,
        topology_id: &str,
        ctx: &RequestContext,
    ) -> Result<TopologySnapshot, NetError>;

    /// Fetch the ring document (virtual-node list) for a topology hash.
    async fn topo_ring(
        &self,
        node: &TopologyNode,
        topology_id: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<RingDescriptor>, NetError>;
}

/// Decode a JSON response body into a typed value.
///
/// Decode failures indicate a protocol/shape mismatch, not transient
/// unavailability; [`NetError::Decode`] is never retried.
pub fn decode_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, NetError> {
    serde_json::from_slice(body).map_err(|e| NetError::Decode(e.to_string()))
}
