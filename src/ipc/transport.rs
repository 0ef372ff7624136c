//! The host's view of a plugin endpoint.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::protocol::JsonRpcError;
use crate::contract::{Bundle, QueryAddress, RowSet};

/// Errors crossing the process boundary.
///
/// Host code never lets these escape its public API; they are converted
/// into absent values at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint refused this caller.
    #[error("Permission denied by {0}")]
    PermissionDenied(String),

    /// No installed endpoint has this authority.
    #[error("Unknown authority: {0}")]
    UnknownAuthority(String),

    /// The endpoint does not support the request.
    #[error("Unsupported by {authority}: {message}")]
    Unsupported { authority: String, message: String },

    /// The plugin process could not be started.
    #[error("Failed to spawn plugin process: {0}")]
    Spawn(#[from] std::io::Error),

    /// The plugin answered with something we could not understand.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The plugin reported an error.
    #[error("Plugin error: {0}")]
    Remote(JsonRpcError),

    /// The plugin process went away.
    #[error("Connection to {0} closed")]
    Closed(String),

    /// No answer within the transport's call deadline.
    #[error("Timeout waiting for {0}")]
    Timeout(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

/// Request/response access to installed plugin endpoints, on behalf of one
/// caller identity.
#[async_trait]
pub trait PluginTransport: Send + Sync {
    /// Out-of-band call (`GetType`, `GetState`, ...). `Ok(None)` when the
    /// endpoint returned nothing.
    async fn call(&self, authority: &str, method: &str) -> Result<Option<Bundle>, TransportError>;

    /// Row query. Returns `Ok(None)` when the endpoint returned nothing or
    /// when `cancel` fired before an answer arrived.
    async fn query(
        &self,
        address: &QueryAddress,
        cancel: CancellationToken,
    ) -> Result<Option<RowSet>, TransportError>;

    /// Launch the endpoint's interactive grant flow for this caller.
    /// Returns whether access was granted.
    async fn request_permission(&self, authority: &str) -> Result<bool, TransportError> {
        Err(TransportError::Unsupported {
            authority: authority.to_string(),
            message: "interactive permission requests".to_string(),
        })
    }
}
