//! In-process transport.
//!
//! Routes calls to [`Endpoint`]s registered in the same process. Useful for
//! built-in plugins and for tests; the endpoint still only sees a caller
//! name and an address, exactly as over stdio.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::transport::{PluginTransport, TransportError};
use crate::contract::{Bundle, QueryAddress, RowSet};
use crate::provider::{Endpoint, EndpointError};

/// Transport over endpoints living in this process.
pub struct InProcessTransport {
    caller: String,
    endpoints: RwLock<HashMap<String, Arc<dyn Endpoint>>>,
}

impl InProcessTransport {
    /// Create a transport calling on behalf of `caller`.
    pub fn new(caller: impl Into<String>) -> Self {
        Self { caller: caller.into(), endpoints: RwLock::new(HashMap::new()) }
    }

    /// Make `endpoint` reachable under `authority`.
    pub fn register(&self, authority: impl Into<String>, endpoint: Arc<dyn Endpoint>) {
        self.endpoints.write().insert(authority.into(), endpoint);
    }

    /// Remove an endpoint. Returns whether it was registered.
    pub fn unregister(&self, authority: &str) -> bool {
        self.endpoints.write().remove(authority).is_some()
    }

    fn endpoint(&self, authority: &str) -> Result<Arc<dyn Endpoint>, TransportError> {
        self.endpoints
            .read()
            .get(authority)
            .cloned()
            .ok_or_else(|| TransportError::UnknownAuthority(authority.to_string()))
    }
}

fn endpoint_error(authority: &str, error: EndpointError) -> TransportError {
    match error {
        EndpointError::PermissionDenied(_) => TransportError::PermissionDenied(authority.to_string()),
        EndpointError::Unsupported(message) => {
            TransportError::Unsupported { authority: authority.to_string(), message }
        }
        other => TransportError::Protocol(other.to_string()),
    }
}

fn join_error(e: tokio::task::JoinError) -> TransportError {
    TransportError::Protocol(format!("Endpoint task failed: {}", e))
}

#[async_trait]
impl PluginTransport for InProcessTransport {
    async fn call(&self, authority: &str, method: &str) -> Result<Option<Bundle>, TransportError> {
        let endpoint = self.endpoint(authority)?;
        let caller = self.caller.clone();
        let method = method.to_string();

        tokio::task::spawn_blocking(move || endpoint.call(&caller, &method))
            .await
            .map_err(join_error)?
            .map_err(|e| endpoint_error(authority, e))
    }

    async fn query(
        &self,
        address: &QueryAddress,
        cancel: CancellationToken,
    ) -> Result<Option<RowSet>, TransportError> {
        let authority = address.authority();
        let endpoint = self.endpoint(authority)?;
        let caller = self.caller.clone();
        let owned = address.clone();

        // the endpoint blocks until its search finishes or `cancel` fires
        tokio::task::spawn_blocking(move || endpoint.query(&caller, &owned, &cancel))
            .await
            .map_err(join_error)?
            .map_err(|e| endpoint_error(authority, e))
    }
}
