//! Error types for network operations.

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to reach the remote endpoint.
    #[error("connection error: {0}")]
    Connect(String),

    /// The request deadline elapsed.
    #[error("request timed out")]
    Timeout,

    /// The node answered with a non-success status.
    #[error("server returned status {code}: {body}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body, lossily decoded for diagnostics.
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The caller cancelled the request context.
    #[error("request cancelled")]
    Cancelled,

    /// The node's endpoint could not be turned into a valid URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl NetError {
    /// Whether failing over to another node could succeed.
    ///
    /// Connection failures, timeouts and 5xx responses are transient; a
    /// 4xx, a decode mismatch or a cancellation is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            NetError::Connect(_) | NetError::Timeout => true,
            NetError::Status { code, .. } => *code >= 500,
            NetError::Decode(_) | NetError::Cancelled | NetError::InvalidEndpoint(_) => false,
        }
    }
}
