//! Cluster-aware client for the rill time-series store.
//!
//! [`RillClient`] keeps a live view of the cluster — membership, per-node
//! health and the consistent-hash ring — via a background monitor, and
//! routes requests by [`Target`]: an explicit node, the owners of a key,
//! or any active node.
//!
//! ```no_run
//! use rill_client::{ClientConfig, RequestContext, RillClient, Target};
//!
//! # async fn example() -> Result<(), rill_client::ClientError> {
//! let config = ClientConfig {
//!     seeds: vec!["10.8.20.1:8112".to_string()],
//!     ..ClientConfig::default()
//! };
//! let client = RillClient::connect(&config)?;
//! let ctx = RequestContext::new();
//! let state: rill_client::NodeState =
//!     client.get_json(Target::AnyActive, "/state", &ctx).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod rollup;
mod tags;


pub use client::{RillClient, Target};
pub use config::ClientConfig;
pub use error::ClientError;
pub use rollup::RollupValue;
pub use tags::{FindTagsItem, FindTagsLatest, FindTagsOptions, FindTagsResult};

pub use rill_net::{NetError, RequestContext};
pub use rill_ring::{Ring, RingError};
pub use rill_topology::NodeRegistry;
pub use rill_types::{
    NodeId, NodeRecord, NodeState, NodeStatus, RingDescriptor, TopologyEvent, TopologyNode,
    TopologySnapshot,
};
