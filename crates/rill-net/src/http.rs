//! reqwest-backed [`Transport`] implementation.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use rill_types::{NodeState, RingDescriptor, TopologyNode, TopologySnapshot};
use tracing::debug;
use url::Url;

use crate::context::RequestContext;
use crate::error::NetError;
use crate::{Response, Transport, decode_json};

/// Idle connections kept per node.
const POOL_MAX_IDLE_PER_HOST: usize = 16;
/// How long an idle pooled connection is kept.
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;
/// TCP connect timeout, separate from per-request deadlines.
const CONNECT_TIMEOUT_MS: u64 = 1_500;

/// HTTP transport for talking to store nodes.
///
/// Wraps a pooled [`reqwest::Client`]; request deadlines and cancellation
/// come from the caller's [`RequestContext`], not the client itself.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the default pooled client.
    pub fn new() -> Result<Self, NetError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS))
            .connect_timeout(Duration::from_millis(CONNECT_TIMEOUT_MS))
            .build()
            .map_err(|e| NetError::Connect(e.to_string()))?;
        Ok(Self { client })
    }

    /// Create a transport wrapping a caller-configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build the URL for a path on a node's API endpoint.
    fn node_url(node: &TopologyNode, path: &str) -> Result<Url, NetError> {
        let base = format!("http://{}:{}/", node.address, node.api_port);
        let base = Url::parse(&base).map_err(|e| NetError::InvalidEndpoint(e.to_string()))?;
        base.join(path.trim_start_matches('/'))
            .map_err(|e| NetError::InvalidEndpoint(e.to_string()))
    }
}

/// Map a reqwest error onto the transport taxonomy.
fn classify(e: reqwest::Error) -> NetError {
    if e.is_timeout() {
        NetError::Timeout
    } else if e.is_decode() {
        NetError::Decode(e.to_string())
    } else {
        NetError::Connect(e.to_string())
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn perform(
        &self,
        node: &TopologyNode,
        method: &str,
        path: &str,
        body: Option<Bytes>,
        headers: &[(String, String)],
        ctx: &RequestContext,
    ) -> Result<Response, NetError> {
        let url = Self::node_url(node, path)?;
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| NetError::InvalidEndpoint(format!("invalid method: {method}")))?;

        debug!(node = %node.id, %method, %url, "dispatching request");

        let mut request = self.client.request(method, url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        ctx.run(async move {
            let response = request.send().await.map_err(classify)?;
            let status = response.status().as_u16();

            let mut header_map = HashMap::new();
            for (name, value) in response.headers() {
                if let Ok(value) = value.to_str() {
                    header_map.insert(name.as_str().to_ascii_lowercase(), value.to_string());
                }
            }

            let body = response.bytes().await.map_err(classify)?;

            if !(200..300).contains(&status) {
                return Err(NetError::Status {
                    code: status,
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }

            Ok(Response {
                status,
                headers: header_map,
                body,
            })
        })
        .await
    }

    async fn node_state(
        &self,
        node: &TopologyNode,
        ctx: &RequestContext,
    ) -> Result<NodeState, NetError> {
        let response = self.perform(node, "GET", "/state", None, &[], ctx).await?;
        decode_json(&response.body)
    }

    async fn topology(
        &self,
        node: &TopologyNode,
        topology_id: &str,
        ctx: &RequestContext,
    ) -> Result<TopologySnapshot, NetError> {
        let path = format!("/topology/json/{topology_id}");
        let response = self.perform(node, "GET", &path, None, &[], ctx).await?;
        let nodes: Vec<TopologyNode> = decode_json(&response.body)?;
        Ok(TopologySnapshot::from_nodes(topology_id, nodes))
    }

    async fn topo_ring(
        &self,
        node: &TopologyNode,
        topology_id: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<RingDescriptor>, NetError> {
        let path = format!("/toporing/json/{topology_id}");
        let response = self.perform(node, "GET", &path, None, &[], ctx).await?;
        decode_json(&response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_types::NodeId;

    fn node(address: &str, api_port: u16) -> TopologyNode {
        TopologyNode {
            id: NodeId::from("n1"),
            address: address.to_string(),
            port: 8112,
            api_port,
            weight: 32,
            n: 2,
        }
    }

    #[test]
    fn test_node_url_joins_path_and_query() {
        let url = HttpTransport::node_url(&node("10.8.20.1", 8112), "/rollup/abc?start_ts=1")
            .unwrap();
        assert_eq!(url.as_str(), "http://10.8.20.1:8112/rollup/abc?start_ts=1");
    }

    #[test]
    fn test_node_url_without_leading_slash() {
        let url = HttpTransport::node_url(&node("example.com", 80), "state").unwrap();
        assert_eq!(url.as_str(), "http://example.com/state");
    }

    #[test]
    fn test_node_url_rejects_invalid_address() {
        let err = HttpTransport::node_url(&node("not a host", 8112), "/state").unwrap_err();
        assert!(matches!(err, NetError::InvalidEndpoint(_)));
    }
}
