//! Client-level error taxonomy.

use rill_net::NetError;
use rill_ring::RingError;
use rill_types::NodeId;
use thiserror::Error;

/// Errors surfaced by [`crate::RillClient`] operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Key-based targeting was attempted before a ring was loaded.
    #[error(transparent)]
    Ring(#[from] RingError),

    /// No node is currently classified active.
    #[error("no active node available")]
    NoActiveNode,

    /// An explicitly targeted node is not in the registry.
    #[error("unknown node: {0}")]
    NodeNotFound(NodeId),

    /// The transport failed; see [`NetError`] for retryability.
    #[error(transparent)]
    Net(#[from] NetError),

    /// A request body could not be serialized.
    #[error("failed to encode request body: {0}")]
    Encode(String),

    /// The client configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether this error means the caller cancelled the operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Net(NetError::Cancelled))
    }

    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Net(e) if e.is_retryable())
    }
}
